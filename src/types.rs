use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of an element within one DOM snapshot. Not stable across navigations.
pub type ElementId = u32;

/// Element id to driver-resolvable locator (an XPath for the Chrome driver).
pub type LocatorMap = BTreeMap<ElementId, String>;

/// Extra attempts allowed for invalid decisions and execution faults.
pub const MAX_RETRIES: u32 = 2;

/// Upper bound on act iterations within a single call.
pub const MAX_STEPS_PER_ACT: usize = 25;

pub(crate) const SCROLLED_STEP: &str = "## Step: Scrolled to another section\n";

/// One DOM chunk as produced by the snapshot provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// One `id:<element>` line per serialized element.
    pub encoding: String,
    pub locator_map: LocatorMap,
    /// Index of the chunk this snapshot encodes.
    pub chunk: usize,
    /// Every chunk index on the page, in visiting order.
    pub chunks: Vec<usize>,
}

impl DomSnapshot {
    /// Text serialized for `id`, if the encoding contains it.
    pub fn element_text(&self, id: ElementId) -> Option<&str> {
        let prefix = format!("{id}:");
        self.encoding
            .lines()
            .find(|line| line.starts_with(&prefix))
            .map(|line| &line[prefix.len()..])
    }

    /// Ids referenced by the encoding, in order of appearance.
    pub fn referenced_ids(&self) -> Vec<ElementId> {
        self.encoding
            .lines()
            .filter_map(|line| line.split_once(':'))
            .filter_map(|(id, _)| id.trim().parse().ok())
            .collect()
    }

    /// True when every id in the encoding resolves in the locator map.
    pub fn is_consistent(&self) -> bool {
        self.referenced_ids()
            .iter()
            .all(|id| self.locator_map.contains_key(id))
    }

    pub fn chunks_total(&self) -> usize {
        self.chunks.len()
    }
}

/// Interaction a model may choose for an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Click,
    Fill,
    Type,
    ScrollIntoView,
    /// Anything outside the vocabulary; executing it is an invalid decision.
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Click => "click",
            Method::Fill => "fill",
            Method::Type => "type",
            Method::ScrollIntoView => "scrollIntoView",
            Method::Other(name) => name,
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        match name {
            "click" => Method::Click,
            "fill" => Method::Fill,
            "type" => Method::Type,
            "scrollIntoView" => Method::ScrollIntoView,
            other => Method::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The model's chosen next step.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDecision {
    pub element: ElementId,
    pub method: Method,
    pub args: Vec<String>,
    pub step: String,
    pub why: String,
    /// The model believes the goal is reached after this step.
    pub completed: bool,
}

/// How screenshots take part in an act call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionMode {
    Off,
    On,
    /// Text only, escalating to `On` once every chunk has been skipped.
    #[default]
    Fallback,
}

#[derive(Debug, Clone, Default)]
pub struct ActOptions {
    pub model: Option<String>,
    pub vision: VisionMode,
}

impl ActOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_vision(mut self, vision: VisionMode) -> Self {
        self.vision = vision;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActResult {
    pub success: bool,
    pub message: String,
    pub action: String,
}

impl ActResult {
    pub(crate) fn failure(action: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            action: action.to_string(),
        }
    }
}

/// Running merged result of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAccumulator {
    pub payload: Value,
    pub progress: String,
    pub completed: bool,
    pub chunks_seen: usize,
    pub chunks_total: usize,
}

/// Outcome of resolving a description to an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserveResult {
    NoMatch,
    Found {
        element: ElementId,
        locator: String,
        fingerprint: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DomSnapshot {
        DomSnapshot {
            encoding: "0:<a>About</a>\n3:<button>Sign in</button>\n".to_string(),
            locator_map: LocatorMap::from([
                (0, "/html/body/a[1]".to_string()),
                (3, "/html/body/button".to_string()),
            ]),
            chunk: 0,
            chunks: vec![0, 1],
        }
    }

    #[test]
    fn element_text_finds_line_by_id() {
        let snap = snapshot();
        assert_eq!(snap.element_text(3), Some("<button>Sign in</button>"));
        assert_eq!(snap.element_text(1), None);
    }

    #[test]
    fn referenced_ids_resolve_in_locator_map() {
        let snap = snapshot();
        assert_eq!(snap.referenced_ids(), vec![0, 3]);
        assert!(snap.is_consistent());
    }

    #[test]
    fn dangling_id_breaks_consistency() {
        let mut snap = snapshot();
        snap.encoding.push_str("7:<input>\n");
        assert!(!snap.is_consistent());
    }

    #[test]
    fn method_vocabulary() {
        assert_eq!(Method::from("click"), Method::Click);
        assert_eq!(Method::from("scrollIntoView"), Method::ScrollIntoView);
        assert_eq!(Method::from("hover"), Method::Other("hover".to_string()));
        assert_eq!(Method::Fill.to_string(), "fill");
    }

    #[test]
    fn vision_mode_defaults_to_fallback() {
        assert_eq!(VisionMode::default(), VisionMode::Fallback);
        let parsed: VisionMode = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(parsed, VisionMode::On);
    }
}
