use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Browser::{
    SetDownloadBehavior, SetDownloadBehaviorBehaviorOption,
};
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use parking_lot::Mutex;
use tracing::{debug, info};

use pagehand::{BrowserDriver, BrowserError, DomSnapshot, ElementHandle, LocatorMap};

use crate::dom;

const DEBUG_ADDRESS: &str = "http://127.0.0.1:9222";
const READY_POLL: Duration = Duration::from_millis(100);

/// Chrome session driven over the DevTools protocol. Created once, reused
/// for every scenario.
pub struct ChromeDriver {
    browser: Browser,
    tab: Mutex<Arc<Tab>>,
}

impl ChromeDriver {
    /// Attach to a Chrome already listening on port 9222, or launch one.
    pub fn connect_or_launch(headless: bool) -> Result<Self> {
        info!(category = "hands", "Attempting to attach to existing Chrome on port 9222...");
        if let Ok(browser) = Browser::connect(DEBUG_ADDRESS.to_string()) {
            info!(category = "hands", "Attached to existing Chrome");
            let existing = browser
                .get_tabs()
                .lock()
                .map_err(|_| anyhow!("tab list lock poisoned"))?
                .first()
                .cloned();
            let tab = match existing {
                Some(tab) => tab,
                None => browser.new_tab()?,
            };
            return Ok(Self::from_parts(browser, tab));
        }

        info!(category = "hands", headless, "Could not attach. Launching Chrome...");
        let options = LaunchOptions {
            headless,
            window_size: Some((1280, 720)),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };
        let browser = Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {e}"))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        info!(category = "hands", "Chrome ready");
        Ok(Self::from_parts(browser, tab))
    }

    fn from_parts(browser: Browser, tab: Arc<Tab>) -> Self {
        Self {
            browser,
            tab: Mutex::new(tab),
        }
    }

    /// Run `f` against the current tab on the blocking pool.
    async fn with_tab<T, F>(&self, f: F) -> Result<T, BrowserError>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = self.tab.lock().clone();
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| BrowserError::Driver(format!("browser task failed: {e}")))?
            .map_err(|e| BrowserError::Driver(format!("{e:#}")))
    }

    async fn with_element<F>(&self, element: &ElementHandle, f: F) -> Result<(), BrowserError>
    where
        F: FnOnce(&Tab, &Element<'_>) -> Result<()> + Send + 'static,
    {
        let locator = element.locator.clone();
        self.with_tab(move |tab| {
            let el = tab.find_element_by_xpath(&locator)?;
            f(tab, &el)
        })
        .await
    }

    fn tabs(&self) -> Result<Vec<Arc<Tab>>, BrowserError> {
        self.browser
            .get_tabs()
            .lock()
            .map(|tabs| tabs.clone())
            .map_err(|_| BrowserError::Driver("tab list lock poisoned".into()))
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn find_element(&self, locator: &str) -> Result<ElementHandle, BrowserError> {
        let xpath = locator.to_string();
        let found = self
            .with_tab(move |tab| Ok(tab.find_element_by_xpath(&xpath).is_ok()))
            .await?;
        if !found {
            return Err(BrowserError::ElementNotFound(locator.to_string()));
        }
        Ok(ElementHandle {
            locator: locator.to_string(),
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.with_element(element, |_, el| {
            el.click()?;
            Ok(())
        })
        .await
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.with_element(element, |_, el| {
            el.call_js_fn(
                "function() { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }",
                vec![],
                false,
            )?;
            Ok(())
        })
        .await
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        let text = text.to_string();
        self.with_element(element, move |tab, el| {
            el.focus()?;
            tab.type_str(&text)?;
            Ok(())
        })
        .await
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.with_element(element, |_, el| {
            el.call_js_fn(dom::SCROLL_INTO_VIEW_JS, vec![], false)?;
            Ok(())
        })
        .await
    }

    async fn scroll_to_top(&self) -> Result<(), BrowserError> {
        self.with_tab(|tab| dom::scroll_to_top(tab)).await
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.tab.lock().get_url())
    }

    async fn window_handles(&self) -> Result<Vec<String>, BrowserError> {
        Ok(self
            .tabs()?
            .iter()
            .map(|tab| tab.get_target_id().to_string())
            .collect())
    }

    async fn switch_window(&self, handle: &str) -> Result<(), BrowserError> {
        let tab = self
            .tabs()?
            .into_iter()
            .find(|tab| tab.get_target_id() == handle)
            .ok_or_else(|| BrowserError::WindowNotFound(handle.to_string()))?;
        debug!(category = "hands", handle, "Switched window");
        *self.tab.lock() = tab;
        Ok(())
    }

    async fn close_window(&self) -> Result<(), BrowserError> {
        self.with_tab(|tab| {
            tab.close(true)?;
            Ok(())
        })
        .await
    }

    async fn wait_until_ready(&self, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.with_tab(|tab| dom::ready_state(tab)).await?;
            if state == "complete" {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn process_dom(&self, chunks_seen: &[usize]) -> Result<DomSnapshot, BrowserError> {
        let seen = chunks_seen.to_vec();
        self.with_tab(move |tab| dom::process_dom(tab, &seen))
            .await
            .map_err(into_script_error)
    }

    async fn process_all_dom(&self) -> Result<DomSnapshot, BrowserError> {
        self.with_tab(|tab| dom::process_all_dom(tab))
            .await
            .map_err(into_script_error)
    }

    async fn screenshot(
        &self,
        full_page: bool,
        quality: Option<u8>,
    ) -> Result<Vec<u8>, BrowserError> {
        self.with_tab(move |tab| {
            let clip = if full_page {
                let (width, height) = dom::document_size(tab)?;
                Some(Viewport {
                    x: 0.0,
                    y: 0.0,
                    width,
                    height,
                    scale: 1.0,
                })
            } else {
                None
            };
            let format = match quality {
                Some(_) => CaptureScreenshotFormatOption::Jpeg,
                None => CaptureScreenshotFormatOption::Png,
            };
            tab.capture_screenshot(format, quality.map(u32::from), clip, true)
        })
        .await
    }

    async fn annotate_elements(&self, locators: &LocatorMap) -> Result<(), BrowserError> {
        let locators = locators.clone();
        self.with_tab(move |tab| dom::annotate(tab, &locators))
            .await
            .map_err(into_script_error)
    }

    async fn clear_annotations(&self) -> Result<(), BrowserError> {
        self.with_tab(|tab| dom::clear_annotations(tab))
            .await
            .map_err(into_script_error)
    }

    async fn start_dom_debug(&self, locators: &LocatorMap, chunk: usize) -> Result<(), BrowserError> {
        let locators = locators.clone();
        self.with_tab(move |tab| dom::debug_dom(tab, &locators, chunk))
            .await
            .map_err(into_script_error)
    }

    async fn cleanup_dom_debug(&self) -> Result<(), BrowserError> {
        self.with_tab(|tab| dom::cleanup_debug(tab))
            .await
            .map_err(into_script_error)
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<(), BrowserError> {
        let download_path = dir.display().to_string();
        debug!(category = "hands", %download_path, "Setting download directory");
        self.with_tab(move |tab| {
            tab.call_method(SetDownloadBehavior {
                behavior: SetDownloadBehaviorBehaviorOption::Allow,
                browser_context_id: None,
                download_path: Some(download_path),
                events_enabled: None,
            })?;
            Ok(())
        })
        .await
    }
}

fn into_script_error(e: BrowserError) -> BrowserError {
    match e {
        BrowserError::Driver(message) => BrowserError::Script(message),
        other => other,
    }
}
