use tracing::info;

use crate::browser::BrowserDriver;
use crate::error::{BrowserError, Error, Result};
use crate::inference::{InferenceGateway, Observation};
use crate::ledger::Ledger;
use crate::types::ObserveResult;

/// Maps a description to one element of the full, unchunked page.
pub struct ObservationResolver<'a> {
    driver: &'a dyn BrowserDriver,
    gateway: &'a InferenceGateway,
    ledger: &'a Ledger,
}

impl<'a> ObservationResolver<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        gateway: &'a InferenceGateway,
        ledger: &'a Ledger,
    ) -> Self {
        Self {
            driver,
            gateway,
            ledger,
        }
    }

    pub async fn observe(&self, description: &str, model: &str) -> Result<ObserveResult> {
        self.gateway.provider().client(model)?;
        let snapshot = self.driver.process_all_dom().await?;
        let element = match self
            .gateway
            .observe(model, description, &snapshot.encoding)
            .await?
        {
            Observation::NoMatch => {
                info!(category = "observation", "No element matches: {description}");
                return Ok(ObserveResult::NoMatch);
            }
            Observation::Element(id) => id,
        };

        let locator = snapshot
            .locator_map
            .get(&element)
            .cloned()
            .ok_or(Error::UnknownElement(element))?;

        match self.driver.find_element(&locator).await {
            Ok(_) => {}
            Err(BrowserError::ElementNotFound(_)) => {
                return Err(Error::ElementMissing {
                    id: element,
                    locator,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let fingerprint = self.ledger.record_observation(description, &locator)?;
        info!(
            category = "observation",
            element,
            %locator,
            "Resolved observation"
        );
        Ok(ObserveResult::Found {
            element,
            locator,
            fingerprint,
        })
    }
}
