use crate::{AutomationError, Selector};
use std::sync::Arc;

/// Handle to an element found by a driver.
///
/// The id is opaque and only meaningful to the driver that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub id: String,
    pub selector: Selector,
}

impl ElementRef {
    pub fn new(id: impl Into<String>, selector: Selector) -> Self {
        Self {
            id: id.into(),
            selector,
        }
    }
}

/// The browser-automation capability every component drives.
///
/// Lookups are immediate: `find_elements` never waits. Waiting and polling
/// belong to the [`LocatorResolver`](crate::LocatorResolver).
#[async_trait::async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Load a URL in the current window
    async fn navigate(&self, url: &str) -> Result<(), AutomationError>;

    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Find all elements currently matching the selector, possibly none
    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementRef>, AutomationError>;

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, AutomationError>;

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool, AutomationError>;

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError>;

    async fn clear(&self, element: &ElementRef) -> Result<(), AutomationError>;

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError>;

    async fn text(&self, element: &ElementRef) -> Result<String, AutomationError>;

    async fn window_handles(&self) -> Result<Vec<String>, AutomationError>;

    async fn current_window(&self) -> Result<String, AutomationError>;

    async fn switch_to_window(&self, handle: &str) -> Result<(), AutomationError>;

    /// Switch into an iframe, or back to the top-level document with `None`
    async fn switch_to_frame(&self, frame: Option<&ElementRef>) -> Result<(), AutomationError>;

    /// Text of the open native dialog, `None` when no dialog is open
    async fn alert_text(&self) -> Result<Option<String>, AutomationError>;

    async fn accept_alert(&self) -> Result<(), AutomationError>;

    /// PNG screenshot of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError>;

    /// End the browser session
    async fn quit(&self) -> Result<(), AutomationError>;
}

/// Produces a fresh driver for one unit of work (a CLI command or a scheduled job).
#[async_trait::async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, AutomationError>;
}
