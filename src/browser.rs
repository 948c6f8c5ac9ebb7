//! Capability the controllers need from a live browser.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;
use crate::types::{DomSnapshot, LocatorMap};

/// A live element, resolved from a locator at the time of lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub locator: String,
}

/// Browser automation driver.
///
/// The controllers assume exclusive use of the driver for the duration of
/// one call and never issue two commands at once.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Resolve a locator, failing with [`BrowserError::ElementNotFound`] when absent.
    async fn find_element(&self, locator: &str) -> Result<ElementHandle, BrowserError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    async fn clear(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError>;

    /// Smooth-scroll the element to the viewport center.
    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), BrowserError>;

    async fn scroll_to_top(&self) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Open windows, oldest first.
    async fn window_handles(&self) -> Result<Vec<String>, BrowserError>;

    async fn switch_window(&self, handle: &str) -> Result<(), BrowserError>;

    /// Close the current window.
    async fn close_window(&self) -> Result<(), BrowserError>;

    /// Wait for the document to settle. `Ok(false)` means the wait timed out.
    async fn wait_until_ready(&self, timeout: Duration) -> Result<bool, BrowserError>;

    /// Next unseen chunk of interactive elements. Once every chunk has been
    /// seen the last chunk is returned again.
    async fn process_dom(&self, chunks_seen: &[usize]) -> Result<DomSnapshot, BrowserError>;

    /// The whole page as a single chunk.
    async fn process_all_dom(&self) -> Result<DomSnapshot, BrowserError>;

    async fn screenshot(&self, full_page: bool, quality: Option<u8>)
    -> Result<Vec<u8>, BrowserError>;

    /// Box and number every element of `locators` on the page.
    async fn annotate_elements(&self, locators: &LocatorMap) -> Result<(), BrowserError>;

    async fn clear_annotations(&self) -> Result<(), BrowserError>;

    /// Outline the elements of the chunk being worked on.
    async fn start_dom_debug(&self, locators: &LocatorMap, chunk: usize)
    -> Result<(), BrowserError>;

    async fn cleanup_dom_debug(&self) -> Result<(), BrowserError>;

    /// Save files the page downloads into `dir`, which must exist.
    async fn set_download_dir(&self, dir: &Path) -> Result<(), BrowserError>;
}
