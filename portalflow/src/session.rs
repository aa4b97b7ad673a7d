//! Login/logout state machine for the portal.

use crate::diagnostics::Diagnostics;
use crate::driver::BrowserDriver;
use crate::locator::{LocatorResolver, Requirement};
use crate::portal::PortalLayout;
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Unauthenticated,
    PortalLoaded,
    CredentialPromptShown,
    AwaitingAuthentication,
    Authenticated,
    LoggedOut,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Unauthenticated => 0,
            SessionState::PortalLoaded => 1,
            SessionState::CredentialPromptShown => 2,
            SessionState::AwaitingAuthentication => 3,
            SessionState::Authenticated => 4,
            SessionState::LoggedOut => 5,
        }
    }

    /// Transitions move one step forward; any state may fall back to `Unauthenticated`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        next == SessionState::Unauthenticated || next.rank() == self.rank() + 1
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Result of a login attempt that got past navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    /// No authenticated indicator appeared in time
    Failed { diagnostic: Option<PathBuf> },
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated)
    }
}

fn claimed_drivers() -> MutexGuard<'static, HashSet<usize>> {
    static CLAIMED: OnceLock<Mutex<HashSet<usize>>> = OnceLock::new();
    CLAIMED
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a driver as owned by one logging-in or authenticated session.
#[derive(Debug)]
struct DriverClaim(usize);

impl DriverClaim {
    fn acquire(driver: &Arc<dyn BrowserDriver>) -> Result<Self, AutomationError> {
        let address = Arc::as_ptr(driver) as *const () as usize;
        if !claimed_drivers().insert(address) {
            return Err(AutomationError::DriverInUse(
                "another session is signed in through this browser".to_string(),
            ));
        }
        Ok(Self(address))
    }
}

impl Drop for DriverClaim {
    fn drop(&mut self) {
        claimed_drivers().remove(&self.0);
    }
}

/// Timing knobs for the login flow
#[derive(Debug, Clone)]
pub struct LoginSettings {
    /// Poll window for authenticated indicators
    pub timeout: Duration,
    /// Added to `timeout` when a human completes the credential prompt
    pub manual_window: Duration,
    pub poll_interval: Duration,
    /// Per-candidate bound for the credential trigger, password field and logout control
    pub control_timeout: Duration,
    pub page_settle: Duration,
    pub popup_settle: Duration,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            manual_window: Duration::from_secs(240),
            poll_interval: Duration::from_secs(1),
            control_timeout: Duration::from_secs(5),
            page_settle: Duration::from_secs(2),
            popup_settle: Duration::from_secs(3),
        }
    }
}

/// Owns the browser driver for its lifetime and tracks authentication state.
pub struct Session {
    driver: Arc<dyn BrowserDriver>,
    resolver: LocatorResolver,
    layout: Arc<PortalLayout>,
    settings: LoginSettings,
    diagnostics: Diagnostics,
    state: SessionState,
    claim: Option<DriverClaim>,
}

impl Session {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        layout: Arc<PortalLayout>,
        settings: LoginSettings,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            resolver: LocatorResolver::new(driver.clone()),
            driver,
            layout,
            settings,
            diagnostics,
            state: SessionState::Unauthenticated,
            claim: None,
        }
    }

    pub fn with_resolver(mut self, resolver: LocatorResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    pub fn resolver(&self) -> &LocatorResolver {
        &self.resolver
    }

    pub fn layout(&self) -> &Arc<PortalLayout> {
        &self.layout
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn transition(&mut self, next: SessionState) -> Result<(), AutomationError> {
        if !self.state.can_transition_to(next) {
            return Err(AutomationError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(from = %self.state, to = %next, "Session transition");
        self.state = next;
        Ok(())
    }

    /// Run the whole login flow.
    ///
    /// Navigation errors are returned as `Err`. Trigger and credential popup
    /// problems are logged and ignored. Only the final poll produces
    /// [`LoginOutcome::Failed`], together with one diagnostic screenshot.
    ///
    /// A driver serves one session at a time: logging in through a driver that
    /// another live session is signed in with fails with `DriverInUse`.
    #[instrument(skip(self, secret))]
    pub async fn login(
        &mut self,
        secret: Option<&str>,
        wait_for_manual: bool,
    ) -> Result<LoginOutcome, AutomationError> {
        if self.state == SessionState::Authenticated {
            if self.is_logged_in().await {
                info!("Session already authenticated");
                return Ok(LoginOutcome::Authenticated);
            }
            warn!("Portal session expired, logging in again");
        }
        if self.state != SessionState::Unauthenticated {
            self.transition(SessionState::Unauthenticated)?;
        }
        if self.claim.is_none() {
            self.claim = Some(DriverClaim::acquire(&self.driver)?);
        }

        let outcome = self.authenticate(secret, wait_for_manual).await;
        if !matches!(outcome, Ok(LoginOutcome::Authenticated)) {
            self.claim = None;
        }
        outcome
    }

    async fn authenticate(
        &mut self,
        secret: Option<&str>,
        wait_for_manual: bool,
    ) -> Result<LoginOutcome, AutomationError> {
        self.load_portal().await?;
        self.open_credential_prompt().await?;
        self.submit_credential(secret).await?;

        let mut window = self.settings.timeout;
        if wait_for_manual {
            window += self.settings.manual_window;
            info!("============================================================");
            info!("Select the certificate and finish logging in manually.");
            info!("Waiting up to {:?} for the portal to confirm the login.", window);
            info!("============================================================");
        }

        if self.await_authentication(window).await {
            self.transition(SessionState::Authenticated)?;
            info!("Portal login complete");
            sleep(self.settings.page_settle).await;
            Ok(LoginOutcome::Authenticated)
        } else {
            let timeout = AutomationError::AuthenticationTimeout(format!(
                "no authenticated indicator within {window:?}"
            ));
            warn!("Login failed: {}", timeout);
            let diagnostic = self
                .diagnostics
                .capture(self.driver.as_ref(), "login_error")
                .await;
            self.transition(SessionState::Unauthenticated)?;
            Ok(LoginOutcome::Failed { diagnostic })
        }
    }

    /// `Unauthenticated -> PortalLoaded`
    pub async fn load_portal(&mut self) -> Result<(), AutomationError> {
        info!("Opening portal: {}", self.layout.entry_url);
        if let Err(e) = self.driver.navigate(&self.layout.entry_url).await {
            return Err(AutomationError::NavigationFailure(format!(
                "{}: {e}",
                self.layout.entry_url
            )));
        }
        self.transition(SessionState::PortalLoaded)?;
        sleep(self.settings.page_settle).await;
        Ok(())
    }

    /// `PortalLoaded -> CredentialPromptShown`. A missing trigger is only a warning:
    /// the site may already show the credential chooser.
    pub async fn open_credential_prompt(&mut self) -> Result<(), AutomationError> {
        let resolution = self
            .resolver
            .resolve_within(
                &self.layout.credential_login,
                Requirement::Interactable,
                self.settings.control_timeout,
            )
            .await;

        match resolution.element() {
            Some(trigger) => match self.driver.click(trigger).await {
                Ok(()) => {
                    info!("Clicked credential login trigger");
                    sleep(self.settings.page_settle).await;
                }
                Err(e) => warn!("Credential login trigger click failed: {}", e),
            },
            None => warn!("Credential login trigger not found, continuing"),
        }

        self.transition(SessionState::CredentialPromptShown)
    }

    /// `CredentialPromptShown -> AwaitingAuthentication`. Best effort: the real
    /// chooser is often an external plugin, so failures here are only logged.
    pub async fn submit_credential(&mut self, secret: Option<&str>) -> Result<(), AutomationError> {
        if let Err(e) = self.fill_credential_popup(secret).await {
            warn!("Credential popup automation incomplete: {}", e);
        }
        self.transition(SessionState::AwaitingAuthentication)
    }

    async fn fill_credential_popup(&self, secret: Option<&str>) -> Result<(), AutomationError> {
        sleep(self.settings.popup_settle).await;

        let main_window = self.driver.current_window().await?;
        let popup = self
            .driver
            .window_handles()
            .await?
            .into_iter()
            .find(|handle| *handle != main_window);
        if let Some(handle) = &popup {
            self.driver.switch_to_window(handle).await?;
            info!("Switched to credential popup window");
        }

        let outcome = self.fill_in_current_window(secret).await;

        // Always try to come back to the portal's main document
        if popup.is_some() {
            self.driver.switch_to_window(&main_window).await?;
        }
        self.driver.switch_to_frame(None).await?;
        outcome
    }

    async fn fill_in_current_window(&self, secret: Option<&str>) -> Result<(), AutomationError> {
        if let Some(frame) = self.resolver.probe_present(&self.layout.credential_frame).await {
            self.driver.switch_to_frame(Some(&frame)).await?;
            info!("Switched to credential iframe");
        }

        let Some(secret) = secret else {
            debug!("No credential secret provided, leaving the prompt to the operator");
            return Ok(());
        };

        let password = self
            .resolver
            .resolve_within(
                &self.layout.credential_password,
                Requirement::Presence,
                self.settings.control_timeout,
            )
            .await
            .into_result()?;
        self.driver.clear(&password).await?;
        self.driver.send_keys(&password, secret).await?;
        info!("Entered credential password");

        match self
            .resolver
            .probe_present(&self.layout.credential_confirm)
            .await
        {
            Some(confirm) => {
                self.driver.click(&confirm).await?;
                info!("Clicked credential confirm button");
            }
            None => warn!("Credential confirm button not found"),
        }
        Ok(())
    }

    /// Poll for any authenticated indicator until `window` elapses.
    pub async fn await_authentication(&self, window: Duration) -> bool {
        info!("Waiting for login confirmation...");
        let deadline = Instant::now() + window;
        loop {
            if self.is_logged_in().await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    /// Whether an authenticated indicator is currently displayed.
    pub async fn is_logged_in(&self) -> bool {
        self.resolver
            .probe(&self.layout.authenticated_indicators)
            .await
            .is_some()
    }

    /// `Authenticated -> LoggedOut`; a no-op success when already logged out.
    #[instrument(skip(self))]
    pub async fn logout(&mut self) -> Result<(), AutomationError> {
        if !self.is_logged_in().await {
            info!("Already logged out");
            if self.state == SessionState::Authenticated {
                self.transition(SessionState::LoggedOut)?;
            }
            self.claim = None;
            return Ok(());
        }

        let control = self
            .resolver
            .resolve_within(
                &self.layout.logout_control,
                Requirement::Interactable,
                self.settings.control_timeout,
            )
            .await
            .into_result()?;
        self.driver.click(&control).await?;
        info!("Logged out");
        sleep(self.settings.page_settle).await;

        if self.state == SessionState::Authenticated {
            self.transition(SessionState::LoggedOut)?;
        }
        self.claim = None;
        Ok(())
    }

    /// `LoggedOut -> Unauthenticated`, ready for another login.
    pub fn reset(&mut self) -> Result<(), AutomationError> {
        if self.state != SessionState::Unauthenticated {
            self.transition(SessionState::Unauthenticated)?;
        }
        Ok(())
    }
}
