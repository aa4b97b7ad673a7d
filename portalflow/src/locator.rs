use tracing::{debug, instrument};

use crate::driver::{BrowserDriver, ElementRef};
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// Default per-candidate timeout if none is specified on the locator itself
const DEFAULT_CANDIDATE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a caller needs from the element before it counts as found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The element exists in the document
    Presence,
    /// The element exists and is displayed
    Visible,
    /// The element exists, is displayed and accepts input
    Interactable,
}

/// One way of finding a logical target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorCandidate {
    pub selector: Selector,
    pub timeout: Option<Duration>,
}

/// An ordered list of candidates for one logical UI target.
///
/// Order encodes preference: earlier candidates are tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    name: String,
    candidates: Vec<LocatorCandidate>,
    timeout: Duration, // Default per-candidate timeout for this locator
}

impl Locator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
            timeout: DEFAULT_CANDIDATE_TIMEOUT,
        }
    }

    /// Build a locator from selector expressions, all using the default timeout
    pub fn of<S: Into<Selector>>(
        name: impl Into<String>,
        selectors: impl IntoIterator<Item = S>,
    ) -> Self {
        selectors
            .into_iter()
            .fold(Self::new(name), |locator, selector| locator.or(selector))
    }

    /// Append a candidate using the locator's default timeout
    pub fn or(mut self, selector: impl Into<Selector>) -> Self {
        self.candidates.push(LocatorCandidate {
            selector: selector.into(),
            timeout: None,
        });
        self
    }

    /// Append a candidate with its own timeout
    pub fn or_within(mut self, selector: impl Into<Selector>, timeout: Duration) -> Self {
        self.candidates.push(LocatorCandidate {
            selector: selector.into(),
            timeout: Some(timeout),
        });
        self
    }

    /// Set the timeout used by candidates that don't carry their own.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[LocatorCandidate] {
        &self.candidates
    }

    pub fn timeout_for(&self, candidate: &LocatorCandidate) -> Duration {
        candidate.timeout.unwrap_or(self.timeout)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (i, candidate) in self.candidates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", candidate.selector)?;
        }
        write!(f, "]")
    }
}

/// Why a single candidate did not produce an element
#[derive(Debug, Clone)]
pub struct CandidateMiss {
    pub selector: Selector,
    pub reason: String,
}

/// Outcome of resolving a locator. `NotFound` is a reportable condition, not a crash.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found {
        element: ElementRef,
        /// Position of the winning candidate in the locator
        index: usize,
    },
    NotFound {
        locator: String,
        misses: Vec<CandidateMiss>,
    },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found { .. })
    }

    pub fn element(&self) -> Option<&ElementRef> {
        match self {
            Resolution::Found { element, .. } => Some(element),
            Resolution::NotFound { .. } => None,
        }
    }

    /// Convert into a result for callers that treat a missing target as fatal
    pub fn into_result(self) -> Result<ElementRef, AutomationError> {
        match self {
            Resolution::Found { element, .. } => Ok(element),
            Resolution::NotFound { locator, misses } => {
                let tried: Vec<String> = misses
                    .iter()
                    .map(|m| format!("'{}': {}", m.selector, m.reason))
                    .collect();
                Err(AutomationError::LocatorNotFound(format!(
                    "{locator} (tried {})",
                    tried.join(", ")
                )))
            }
        }
    }
}

/// Tries a locator's candidates in order until one produces an element.
#[derive(Clone)]
pub struct LocatorResolver {
    driver: Arc<dyn BrowserDriver>,
    poll_interval: Duration,
}

impl LocatorResolver {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            driver,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Resolve a locator, polling each candidate up to its own timeout.
    ///
    /// Returns on the first success without touching later candidates.
    /// Each candidate gets exactly one polling window per call.
    #[instrument(level = "debug", skip(self, locator), fields(locator = %locator.name()))]
    pub async fn resolve(&self, locator: &Locator, requirement: Requirement) -> Resolution {
        let mut misses = Vec::with_capacity(locator.candidates().len());

        for (index, candidate) in locator.candidates().iter().enumerate() {
            let timeout = locator.timeout_for(candidate);
            match self.poll_candidate(&candidate.selector, requirement, timeout).await {
                Ok(element) => {
                    debug!(selector = %candidate.selector, index, "Locator candidate matched");
                    return Resolution::Found { element, index };
                }
                Err(reason) => {
                    debug!(selector = %candidate.selector, %reason, "Locator candidate missed");
                    misses.push(CandidateMiss {
                        selector: candidate.selector.clone(),
                        reason,
                    });
                }
            }
        }

        Resolution::NotFound {
            locator: locator.name().to_string(),
            misses,
        }
    }

    /// Same as [`resolve`](Self::resolve) but with every candidate bounded by `timeout`.
    pub async fn resolve_within(
        &self,
        locator: &Locator,
        requirement: Requirement,
        timeout: Duration,
    ) -> Resolution {
        let mut bounded = locator.clone().set_default_timeout(timeout);
        for candidate in bounded.candidates.iter_mut() {
            candidate.timeout = None;
        }
        self.resolve(&bounded, requirement).await
    }

    /// A single immediate pass over the candidates: no waiting, displayed elements only.
    ///
    /// Used by pollers that run their own outer loop (login indicators, verdict texts).
    pub async fn probe(&self, locator: &Locator) -> Option<ElementRef> {
        self.probe_with(locator, Requirement::Visible).await
    }

    /// A single immediate pass that accepts any present element.
    pub async fn probe_present(&self, locator: &Locator) -> Option<ElementRef> {
        self.probe_with(locator, Requirement::Presence).await
    }

    async fn probe_with(&self, locator: &Locator, requirement: Requirement) -> Option<ElementRef> {
        for candidate in locator.candidates() {
            if let Ok(Some(element)) = self.check_once(&candidate.selector, requirement).await {
                return Some(element);
            }
        }
        None
    }

    /// Resolve an interactable element and click it.
    pub async fn click(&self, locator: &Locator) -> Result<ElementRef, AutomationError> {
        let element = self
            .resolve(locator, Requirement::Interactable)
            .await
            .into_result()?;
        self.driver.click(&element).await?;
        Ok(element)
    }

    /// Resolve a present element, clear it and type into it.
    pub async fn fill(&self, locator: &Locator, text: &str) -> Result<ElementRef, AutomationError> {
        let element = self
            .resolve(locator, Requirement::Presence)
            .await
            .into_result()?;
        self.driver.clear(&element).await?;
        self.driver.send_keys(&element, text).await?;
        Ok(element)
    }

    async fn poll_candidate(
        &self,
        selector: &Selector,
        requirement: Requirement,
        timeout: Duration,
    ) -> Result<ElementRef, String> {
        if let Selector::Invalid(reason) = selector {
            return Err(format!("invalid selector: {reason}"));
        }

        let deadline = Instant::now() + timeout;
        let mut last_error = None;
        loop {
            match self.check_once(selector, requirement).await {
                Ok(Some(element)) => return Ok(element),
                Ok(None) => {}
                Err(e) => last_error = Some(e.to_string()),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }

        Err(match last_error {
            Some(e) => format!("timed out after {timeout:?} ({e})"),
            None => format!("timed out after {timeout:?}"),
        })
    }

    async fn check_once(
        &self,
        selector: &Selector,
        requirement: Requirement,
    ) -> Result<Option<ElementRef>, AutomationError> {
        let elements = self.driver.find_elements(selector).await?;
        for element in elements {
            let usable = match requirement {
                Requirement::Presence => true,
                Requirement::Visible => self.driver.is_displayed(&element).await?,
                Requirement::Interactable => {
                    self.driver.is_displayed(&element).await?
                        && self.driver.is_enabled(&element).await?
                }
            };
            if usable {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}
