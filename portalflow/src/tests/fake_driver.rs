//! In-memory browser driver for exercising the engine without a browser.
//!
//! Elements are registered under the display form of the selector that finds
//! them, so tests can use the same expressions as the portal layout.

use crate::driver::{BrowserDriver, DriverFactory, ElementRef};
use crate::locator::Locator;
use crate::{AutomationError, Selector};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// What happens when an element is clicked
#[derive(Debug, Clone)]
pub enum ClickEffect {
    /// Make a displayed, enabled element appear for this selector
    Reveal(String),
    /// Like `Reveal`, with the element reading back the given text
    RevealText(String, String),
    /// Drop a file, like a finished browser download
    WriteFile(PathBuf, Vec<u8>),
    /// Drop a fresh file per click: `claims.xlsx` becomes `claims_1.xlsx`, `claims_2.xlsx`...
    WriteNumbered(PathBuf),
    /// Open a native dialog with this text
    Alert(String),
}

#[derive(Debug, Clone)]
struct FakeElement {
    id: String,
    displayed: bool,
    enabled: bool,
    text: String,
}

#[derive(Debug, Default)]
struct FakeState {
    elements: HashMap<String, Vec<FakeElement>>,
    on_click: HashMap<String, Vec<ClickEffect>>,
    next_id: usize,
    files_written: usize,
    fail_navigation: bool,
    navigations: Vec<String>,
    queries: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    alert: Option<String>,
    accepted_alerts: Vec<String>,
    screenshots: usize,
    quit: bool,
}

#[derive(Debug, Default)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

fn key(selector: &str) -> String {
    Selector::from(selector).to_string()
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add(&self, selector_key: String, displayed: bool, enabled: bool, text: &str) {
        let mut state = self.state();
        state.next_id += 1;
        let element = FakeElement {
            id: format!("el-{}", state.next_id),
            displayed,
            enabled,
            text: text.to_string(),
        };
        state.elements.entry(selector_key).or_default().push(element);
    }

    /// A displayed, enabled element for a selector expression
    pub fn show(&self, selector: &str) {
        self.add(key(selector), true, true, "");
    }

    pub fn show_with_text(&self, selector: &str, text: &str) {
        self.add(key(selector), true, true, text);
    }

    /// The first candidate of a locator becomes available
    pub fn show_first(&self, locator: &Locator) {
        let selector = &locator.candidates()[0].selector;
        self.add(selector.to_string(), true, true, "");
    }

    /// Present in the document but not displayed
    pub fn add_hidden(&self, selector: &str) {
        self.add(key(selector), false, true, "");
    }

    /// Displayed but disabled
    pub fn add_disabled(&self, selector: &str) {
        self.add(key(selector), true, false, "");
    }

    /// The element disappears from the document
    pub fn remove(&self, selector: &str) {
        self.state().elements.remove(&key(selector));
    }

    pub fn on_click(&self, selector: &str, effect: ClickEffect) {
        self.state().on_click.entry(key(selector)).or_default().push(effect);
    }

    /// Attach an effect to a locator's first candidate
    pub fn on_click_first(&self, locator: &Locator, effect: ClickEffect) {
        let selector = locator.candidates()[0].selector.to_string();
        self.state().on_click.entry(selector).or_default().push(effect);
    }

    pub fn fail_navigation(&self) {
        self.state().fail_navigation = true;
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    /// Every selector looked up, in order
    pub fn queries(&self) -> Vec<String> {
        self.state().queries.clone()
    }

    /// Selector keys of clicked elements, in order
    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }

    pub fn clicked(&self, selector: &str) -> bool {
        let wanted = key(selector);
        self.state().clicks.iter().any(|c| *c == wanted)
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state().typed.clone()
    }

    pub fn accepted_alerts(&self) -> Vec<String> {
        self.state().accepted_alerts.clone()
    }

    pub fn screenshots(&self) -> usize {
        self.state().screenshots
    }

    pub fn was_quit(&self) -> bool {
        self.state().quit
    }

    fn selector_of(state: &FakeState, element: &ElementRef) -> Option<(String, FakeElement)> {
        state.elements.iter().find_map(|(selector, elements)| {
            elements
                .iter()
                .find(|e| e.id == element.id)
                .map(|e| (selector.clone(), e.clone()))
        })
    }

    fn lookup(&self, element: &ElementRef) -> Result<(String, FakeElement), AutomationError> {
        Self::selector_of(&self.state(), element)
            .ok_or_else(|| AutomationError::Driver(format!("stale element reference: {}", element.id)))
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        let mut state = self.state();
        if state.fail_navigation {
            return Err(AutomationError::Driver("net::ERR_NAME_NOT_RESOLVED".to_string()));
        }
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        Ok(self.state().navigations.last().cloned().unwrap_or_default())
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementRef>, AutomationError> {
        let mut state = self.state();
        let selector_key = selector.to_string();
        state.queries.push(selector_key.clone());
        Ok(state
            .elements
            .get(&selector_key)
            .map(|elements| {
                elements
                    .iter()
                    .map(|e| ElementRef::new(e.id.clone(), selector.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        Ok(self.lookup(element)?.1.displayed)
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        Ok(self.lookup(element)?.1.enabled)
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        let (selector, _) = self.lookup(element)?;
        let effects = {
            let mut state = self.state();
            state.clicks.push(selector.clone());
            state.on_click.get(&selector).cloned().unwrap_or_default()
        };
        for effect in effects {
            match effect {
                ClickEffect::Reveal(target) => self.show(&target),
                ClickEffect::RevealText(target, text) => self.show_with_text(&target, &text),
                ClickEffect::WriteFile(path, bytes) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, bytes)?;
                }
                ClickEffect::WriteNumbered(template) => {
                    let n = {
                        let mut state = self.state();
                        state.files_written += 1;
                        state.files_written
                    };
                    let stem = template.file_stem().unwrap_or_default().to_string_lossy();
                    let ext = template.extension().unwrap_or_default().to_string_lossy();
                    let path = template.with_file_name(format!("{stem}_{n}.{ext}"));
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, format!("file {n}"))?;
                }
                ClickEffect::Alert(text) => self.state().alert = Some(text),
            }
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.lookup(element)?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError> {
        let (selector, _) = self.lookup(element)?;
        self.state().typed.push((selector, text.to_string()));
        Ok(())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, AutomationError> {
        Ok(self.lookup(element)?.1.text)
    }

    async fn window_handles(&self) -> Result<Vec<String>, AutomationError> {
        Ok(vec!["main".to_string()])
    }

    async fn current_window(&self) -> Result<String, AutomationError> {
        Ok("main".to_string())
    }

    async fn switch_to_window(&self, _handle: &str) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn switch_to_frame(&self, _frame: Option<&ElementRef>) -> Result<(), AutomationError> {
        Ok(())
    }

    async fn alert_text(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.state().alert.clone())
    }

    async fn accept_alert(&self) -> Result<(), AutomationError> {
        let mut state = self.state();
        match state.alert.take() {
            Some(text) => {
                state.accepted_alerts.push(text);
                Ok(())
            }
            None => Err(AutomationError::Driver("no such alert".to_string())),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        self.state().screenshots += 1;
        Ok(FAKE_PNG.to_vec())
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        self.state().quit = true;
        Ok(())
    }
}

/// Hands out the same fake driver on every launch.
pub struct FakeFactory {
    pub driver: Arc<FakeDriver>,
}

#[async_trait]
impl DriverFactory for FakeFactory {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, AutomationError> {
        Ok(self.driver.clone())
    }
}
