//! Natural-language browser automation over a chunked DOM.
//!
//! An [`Agent`] drives a [`BrowserDriver`] toward a goal by asking a language
//! model to act on, extract from, or observe one slice of the page at a time.

pub mod act;
pub mod agent;
pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod inference;
pub mod ledger;
pub mod llm;
pub mod observe;
pub mod prompt;
pub mod schema;
pub mod types;
pub mod vision;

pub use agent::Agent;
pub use browser::{BrowserDriver, ElementHandle};
pub use config::AgentConfig;
pub use error::{BrowserError, Error, InferenceError, LedgerError, Result};
pub use ledger::{EntryKind, Ledger, LedgerEntry, fingerprint};
pub use llm::{Backend, LanguageModelClient, LlmProvider};
pub use schema::{Field, Schema};
pub use types::{
    ActOptions, ActResult, ActionDecision, DomSnapshot, ElementId, ExtractionAccumulator,
    LocatorMap, Method, ObserveResult, VisionMode,
};
