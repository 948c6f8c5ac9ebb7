use tracing::{debug, warn};

use crate::browser::BrowserDriver;
use crate::error::BrowserError;
use crate::types::LocatorMap;

/// Screenshots handed to vision-capable models.
pub struct ScreenshotService<'a> {
    driver: &'a dyn BrowserDriver,
}

impl<'a> ScreenshotService<'a> {
    pub fn new(driver: &'a dyn BrowserDriver) -> Self {
        Self { driver }
    }

    pub async fn screenshot(
        &self,
        full_page: bool,
        quality: Option<u8>,
    ) -> Result<Vec<u8>, BrowserError> {
        if let Some(quality) = quality.filter(|q| *q > 100) {
            return Err(BrowserError::InvalidQuality(quality));
        }
        self.driver.screenshot(full_page, quality).await
    }

    /// Viewport screenshot with every element of `locators` boxed and numbered.
    pub async fn annotated_screenshot(
        &self,
        locators: &LocatorMap,
    ) -> Result<Vec<u8>, BrowserError> {
        self.driver.annotate_elements(locators).await?;
        let shot = self.driver.screenshot(false, None).await;
        if let Err(e) = self.driver.clear_annotations().await {
            warn!(category = "vision", "Failed to remove annotations: {e}");
        }
        let shot = shot?;
        debug!(
            category = "vision",
            elements = locators.len(),
            bytes = shot.len(),
            "Captured annotated screenshot"
        );
        Ok(shot)
    }
}
