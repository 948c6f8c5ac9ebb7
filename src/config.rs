use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::MAX_STEPS_PER_ACT;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Knobs shared by the act, extract and observe loops.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model used when a call does not name one.
    pub default_model: String,
    /// Readiness wait before each DOM snapshot.
    pub dom_settle_timeout: Duration,
    /// Readiness wait after a click that may navigate.
    pub navigation_timeout: Duration,
    pub max_steps_per_act: usize,
    /// Per-character delay range, in milliseconds, when typing into fields.
    pub typing_delay_ms: Range<u64>,
    /// JPEG quality of the screenshot used to verify completion.
    pub verify_screenshot_quality: u8,
    /// Directory of the file-backed ledger; `None` keeps it in memory.
    pub ledger_dir: Option<PathBuf>,
    /// Outline the chunk under consideration on every act iteration.
    pub debug_dom: bool,
    /// Where downloaded PDFs are saved.
    pub download_dir: PathBuf,
    pub download_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            dom_settle_timeout: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(5),
            max_steps_per_act: MAX_STEPS_PER_ACT,
            typing_delay_ms: 25..100,
            verify_screenshot_quality: 15,
            ledger_dir: None,
            debug_dom: false,
            download_dir: PathBuf::from("downloads"),
            download_timeout: Duration::from_secs(30),
        }
    }
}

impl AgentConfig {
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_ledger_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ledger_dir = Some(dir.into());
        self
    }

    pub fn with_typing_delay_ms(mut self, range: Range<u64>) -> Self {
        self.typing_delay_ms = range;
        self
    }

    pub fn with_max_steps_per_act(mut self, steps: usize) -> Self {
        self.max_steps_per_act = steps;
        self
    }

    pub fn with_debug_dom(mut self, enabled: bool) -> Self {
        self.debug_dom = enabled;
        self
    }

    pub fn with_downloads(mut self, dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        self.download_dir = dir.into();
        self.download_timeout = timeout;
        self
    }

    pub fn with_timeouts(mut self, dom_settle: Duration, navigation: Duration) -> Self {
        self.dom_settle_timeout = dom_settle;
        self.navigation_timeout = navigation;
        self
    }

    /// Random pause between two typed characters.
    pub(crate) fn typing_jitter(&self) -> Duration {
        let Range { start, end } = self.typing_delay_ms;
        if end <= start {
            return Duration::from_millis(start);
        }
        let span = (end - start) as f32;
        Duration::from_millis(start + (rand::random::<f32>() * span) as u64)
    }
}
