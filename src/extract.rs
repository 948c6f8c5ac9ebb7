//! Chunk-by-chunk extraction into a schema-shaped accumulator.

use tracing::{debug, info};

use crate::browser::BrowserDriver;
use crate::error::Result;
use crate::inference::{ExtractRequest, InferenceGateway};
use crate::schema::Schema;
use crate::types::ExtractionAccumulator;

pub struct ExtractionController<'a> {
    driver: &'a dyn BrowserDriver,
    gateway: &'a InferenceGateway,
}

impl<'a> ExtractionController<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, gateway: &'a InferenceGateway) -> Self {
        Self { driver, gateway }
    }

    /// Walk the page chunks, refining the payload after each one, until the
    /// model reports completion or every chunk has been read.
    pub async fn extract(
        &self,
        instruction: &str,
        schema: &Schema,
        model: &str,
    ) -> Result<ExtractionAccumulator> {
        self.gateway.provider().client(model)?;
        let mut payload = schema.empty_payload();
        let mut progress = String::new();
        let mut chunks_seen: Vec<usize> = Vec::new();

        loop {
            let snapshot = self.driver.process_dom(&chunks_seen).await?;
            let chunks_total = snapshot.chunks_total();
            if chunks_seen.contains(&snapshot.chunk) {
                debug!(
                    category = "extraction",
                    chunk = snapshot.chunk,
                    "Chunk was already read, stopping"
                );
                return Ok(ExtractionAccumulator {
                    payload,
                    progress,
                    completed: false,
                    chunks_seen: chunks_seen.len(),
                    chunks_total,
                });
            }

            info!(
                category = "extraction",
                "Extracting from chunk {} ({} of {})",
                snapshot.chunk,
                chunks_seen.len() + 1,
                chunks_total
            );
            let outcome = self
                .gateway
                .extract(
                    model,
                    ExtractRequest {
                        instruction,
                        progress: &progress,
                        previous: &payload,
                        dom_elements: &snapshot.encoding,
                        schema,
                        chunks_seen: chunks_seen.len() + 1,
                        chunks_total,
                    },
                )
                .await?;

            payload = schema.unwrap_payload(outcome.payload);
            progress = outcome.progress;
            chunks_seen.push(snapshot.chunk);

            if outcome.completed || chunks_seen.len() >= chunks_total {
                info!(
                    category = "extraction",
                    completed = outcome.completed,
                    "Extraction finished after {} of {} chunks",
                    chunks_seen.len(),
                    chunks_total
                );
                return Ok(ExtractionAccumulator {
                    payload,
                    progress,
                    completed: outcome.completed,
                    chunks_seen: chunks_seen.len(),
                    chunks_total,
                });
            }
        }
    }
}
