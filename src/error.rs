//! Error types for browser, inference and ledger operations.

use thiserror::Error;

use crate::types::ElementId;

/// Faults raised by a [`BrowserDriver`](crate::browser::BrowserDriver).
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The driver or its transport failed.
    #[error("Browser driver error: {0}")]
    Driver(String),

    /// No live element matches the locator.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// An in-page script failed or returned an unexpected shape.
    #[error("Script error: {0}")]
    Script(String),

    /// No window with the given handle exists.
    #[error("Window not found: {0}")]
    WindowNotFound(String),

    #[error("Screenshot quality must be between 0 and 100, got {0}")]
    InvalidQuality(u8),
}

/// Faults raised by the language-model backends and the inference gateway.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The model name is not in the registry.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// The backend for the model has no API key configured.
    #[error("{0} not set in environment")]
    MissingCredentials(String),

    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The backend answered but the payload could not be interpreted.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("No response content from model")]
    EmptyResponse,
}

/// Faults raised while persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error returned by the agent operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The model referenced an element id absent from the snapshot.
    #[error("Element id {0} is not part of the current snapshot")]
    UnknownElement(ElementId),

    /// The element resolved from a snapshot is gone from the live page.
    #[error("Element {id} ({locator}) no longer exists on the page")]
    ElementMissing { id: ElementId, locator: String },

    /// Local filesystem fault outside the ledger, e.g. the download directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A method was chosen without the arguments it needs.
    #[error("Method {0} requires an argument")]
    MissingArgument(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
