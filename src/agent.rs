//! Top-level handle tying a browser, a model provider and the ledger together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::act::ActionController;
use crate::browser::BrowserDriver;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::extract::ExtractionController;
use crate::inference::InferenceGateway;
use crate::ledger::Ledger;
use crate::llm::LlmProvider;
use crate::observe::ObservationResolver;
use crate::schema::Schema;
use crate::types::{ActOptions, ActResult, ExtractionAccumulator, ObserveResult};

const DOWNLOAD_POLL: Duration = Duration::from_millis(500);

pub struct Agent {
    driver: Arc<dyn BrowserDriver>,
    gateway: InferenceGateway,
    ledger: Arc<Ledger>,
    config: AgentConfig,
}

impl Agent {
    /// Build an agent. Opens the file-backed ledger when `config.ledger_dir`
    /// is set, otherwise keeps the ledger in memory.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        provider: LlmProvider,
        config: AgentConfig,
    ) -> Result<Self> {
        let ledger = match &config.ledger_dir {
            Some(dir) => Ledger::open(dir)?,
            None => Ledger::in_memory(),
        };
        Ok(Self::with_ledger(driver, provider, Arc::new(ledger), config))
    }

    pub fn with_ledger(
        driver: Arc<dyn BrowserDriver>,
        provider: LlmProvider,
        ledger: Arc<Ledger>,
        config: AgentConfig,
    ) -> Self {
        Self {
            driver,
            gateway: InferenceGateway::new(provider),
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    /// Navigate and wait for the page to settle. A readiness timeout is not an error.
    pub async fn goto(&self, url: &str) -> Result<()> {
        info!(category = "agent", "Navigating to {url}");
        self.driver.navigate(url).await?;
        if !self
            .driver
            .wait_until_ready(self.config.navigation_timeout)
            .await?
        {
            info!(category = "agent", "Page did not settle before timeout, continuing");
        }
        Ok(())
    }

    pub async fn act(&self, goal: &str, options: ActOptions) -> Result<ActResult> {
        ActionController::new(
            self.driver.as_ref(),
            &self.gateway,
            &self.ledger,
            &self.config,
        )
        .act(goal, &options)
        .await
    }

    pub async fn extract(
        &self,
        instruction: &str,
        schema: &Schema,
        model: Option<&str>,
    ) -> Result<ExtractionAccumulator> {
        ExtractionController::new(self.driver.as_ref(), &self.gateway)
            .extract(instruction, schema, self.model(model))
            .await
    }

    pub async fn observe(&self, description: &str, model: Option<&str>) -> Result<ObserveResult> {
        ObservationResolver::new(self.driver.as_ref(), &self.gateway, &self.ledger)
            .observe(description, self.model(model))
            .await
    }

    /// Click the link to `url` and wait for `<download_dir>/<title>.pdf` to
    /// appear. Returns the file path, or `None` when the click failed or the
    /// file did not show up before `download_timeout`.
    pub async fn download_pdf(&self, url: &str, title: &str) -> Result<Option<PathBuf>> {
        self.gateway.provider().client(&self.config.default_model)?;
        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let dir = tokio::fs::canonicalize(&self.config.download_dir).await?;
        self.driver.set_download_dir(&dir).await?;

        let clicked = self
            .act(&format!("click on {url}"), ActOptions::default())
            .await?;
        if !clicked.success {
            warn!(category = "agent", "Download link was not clicked: {}", clicked.message);
            return Ok(None);
        }

        let path = dir.join(format!("{title}.pdf"));
        let deadline = Instant::now() + self.config.download_timeout;
        loop {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                info!(category = "agent", "Downloaded {}", path.display());
                return Ok(Some(path));
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(category = "agent", "Timed out waiting for {}", path.display());
                return Ok(None);
            }
            tokio::time::sleep(DOWNLOAD_POLL.min(deadline - now)).await;
        }
    }

    /// Plain question answered by the model, without touching the page.
    pub async fn ask(&self, question: &str, model: Option<&str>) -> Result<String> {
        Ok(self.gateway.ask(self.model(model), question).await?)
    }

    fn model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.unwrap_or(&self.config.default_model)
    }
}
