//! Browser engine seam.
//!
//! The adaptation layer needs a narrow slice of what an automation library
//! offers: navigation, DOM querying, element state, fill and click. This
//! trait is that slice.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  BrowserEngine (narrow contract)                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐        ┌──────────────────────────┐    │
//! │  │  ChromiumEngine      │        │  SimulatedDevice         │    │
//! │  │  (feature "browser") │        │  (in-memory device UI)   │    │
//! │  │  CDP via chromiumoxide│       │  unit and scenario tests │    │
//! │  └──────────────────────┘        └──────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method takes `&mut self`: one session drives one page from one
//! logical thread, and the device's configuration lock does not tolerate
//! concurrent edits anyway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::locator::Selector;
use crate::result::ProbeResult;

/// Opaque reference to a live DOM element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Engine-assigned identifier
    pub id: String,
    /// Lowercase tag name
    pub tag_name: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into(),
        }
    }
}

/// Browser automation operations the adaptation layer depends on
#[async_trait]
pub trait BrowserEngine: Send {
    /// Navigate to an absolute URL and wait for the document to load
    async fn navigate(&mut self, url: &str) -> ProbeResult<()>;

    /// Reload the current document
    async fn reload(&mut self) -> ProbeResult<()>;

    /// Current document URL
    async fn current_url(&mut self) -> ProbeResult<String>;

    /// Every element matching the selector, in document order
    async fn query_all(&mut self, selector: &Selector) -> ProbeResult<Vec<ElementHandle>>;

    /// First element matching the selector
    async fn query(&mut self, selector: &Selector) -> ProbeResult<Option<ElementHandle>> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    /// Whether the element is rendered and not hidden
    async fn is_visible(&mut self, element: &ElementHandle) -> ProbeResult<bool>;

    /// Whether the element is not disabled
    async fn is_enabled(&mut self, element: &ElementHandle) -> ProbeResult<bool>;

    /// Whether the element accepts input (enabled and not read-only)
    async fn is_editable(&mut self, element: &ElementHandle) -> ProbeResult<bool>;

    /// Displayed value. Checkboxes read as `true`/`false`.
    async fn read_value(&mut self, element: &ElementHandle) -> ProbeResult<String>;

    /// Replace the element's value and fire the events a user edit would
    async fn fill(&mut self, element: &ElementHandle, value: &str) -> ProbeResult<()>;

    /// Click the element
    async fn click(&mut self, element: &ElementHandle) -> ProbeResult<()>;

    /// First visible element matching the selector
    async fn first_visible(&mut self, selector: &Selector) -> ProbeResult<Option<ElementHandle>> {
        for element in self.query_all(selector).await? {
            if self.is_visible(&element).await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// Whether any element matching the selector is visible
    async fn any_visible(&mut self, selector: &Selector) -> ProbeResult<bool> {
        Ok(self.first_visible(selector).await?.is_some())
    }
}
