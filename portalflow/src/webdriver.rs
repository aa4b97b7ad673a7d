//! Minimal W3C WebDriver client for chromedriver-compatible endpoints.

use crate::config::BrowserSettings;
use crate::driver::{BrowserDriver, DriverFactory, ElementRef};
use crate::errors::AutomationError;
use crate::selector::Selector;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key the protocol uses for element references
const ELEMENT_KEY: &str = "element-6066-11e4-a07a-4f5b0b3d7b4b";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Why a command failed: the HTTP layer, or an error the remote end reported.
#[derive(Debug)]
enum CommandError {
    Transport(AutomationError),
    Remote { code: String, message: String },
}

impl From<CommandError> for AutomationError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Transport(e) => e,
            CommandError::Remote { code, message } => AutomationError::Driver(format!("{code}: {message}")),
        }
    }
}

/// Capabilities for a new session, mirroring the options the portal needs.
fn capabilities(settings: &BrowserSettings, download_dir: &str) -> Result<Value, AutomationError> {
    let options_key = match settings.browser.to_lowercase().as_str() {
        "chrome" | "chromium" => "goog:chromeOptions",
        "edge" | "msedge" => "ms:edgeOptions",
        other => {
            return Err(AutomationError::Config(format!(
                "unsupported browser '{other}' (expected chrome or edge)"
            )))
        }
    };
    let browser_name = if options_key == "ms:edgeOptions" { "MicrosoftEdge" } else { "chrome" };

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!(
            "--user-agent={}",
            settings.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
        ),
    ];
    if settings.headless {
        args.insert(0, "--headless=new".to_string());
    }

    Ok(json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": browser_name,
                options_key: {
                    "args": args,
                    "excludeSwitches": ["enable-automation"],
                    "prefs": {
                        "download.default_directory": download_dir,
                        "download.prompt_for_download": false,
                        "download.directory_upgrade": true,
                        "safebrowsing.enabled": true
                    }
                }
            }
        }
    }))
}

/// One WebDriver session over HTTP.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    base_url: String,
    session_id: String,
    client: reqwest::Client,
}

impl WebDriverClient {
    /// Open a browser session against `settings.webdriver_url`.
    pub async fn start(settings: &BrowserSettings) -> Result<Self, AutomationError> {
        std::fs::create_dir_all(&settings.download_dir)?;
        let download_dir = std::fs::canonicalize(&settings.download_dir)?;
        let body = capabilities(settings, &download_dir.to_string_lossy())?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AutomationError::Driver(format!("Failed to build HTTP client: {e}")))?;
        let base_url = settings.webdriver_url.trim_end_matches('/').to_string();

        let value = Self::send(&client, Method::POST, &format!("{base_url}/session"), Some(body))
            .await
            .map_err(AutomationError::from)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AutomationError::Driver("session response without sessionId".to_string()))?
            .to_string();
        info!("Browser session {} started via {}", session_id, base_url);

        let driver = Self {
            base_url,
            session_id,
            client,
        };
        if !settings.headless {
            if let Err(e) = driver.command(Method::POST, "/window/maximize", Some(json!({}))).await {
                warn!("Could not maximize browser window: {}", e);
            }
        }
        Ok(driver)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn send(
        client: &reqwest::Client,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, CommandError> {
        let mut request = client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| {
            CommandError::Transport(AutomationError::Driver(format!("{method} {url} failed: {e}")))
        })?;
        let status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            CommandError::Transport(AutomationError::Driver(format!(
                "{method} {url}: unreadable response ({status}): {e}"
            )))
        })?;

        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if let Some(code) = value.get("error").and_then(Value::as_str) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(CommandError::Remote {
                code: code.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(CommandError::Transport(AutomationError::Driver(format!(
                "{method} {url} returned {status}"
            ))));
        }
        Ok(value)
    }

    async fn try_command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, CommandError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        debug!("WebDriver {} {}", method, path);
        Self::send(&self.client, method, &url, body).await
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, AutomationError> {
        self.try_command(method, path, body).await.map_err(AutomationError::from)
    }

    fn element_path(element: &ElementRef, action: &str) -> String {
        format!("/element/{}/{}", element.id, action)
    }
}

fn as_string(value: Value) -> Result<String, AutomationError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(AutomationError::Driver(format!("expected a string, got {other}"))),
    }
}

fn as_bool(value: Value) -> Result<bool, AutomationError> {
    value
        .as_bool()
        .ok_or_else(|| AutomationError::Driver(format!("expected a boolean, got {value}")))
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.command(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        as_string(self.command(Method::GET, "/url", None).await?)
    }

    async fn find_elements(&self, selector: &Selector) -> Result<Vec<ElementRef>, AutomationError> {
        let (using, value) = selector
            .to_webdriver()
            .map_err(AutomationError::InvalidSelector)?;
        let found = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": value })),
            )
            .await?;

        let elements = found
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(|id| ElementRef::new(id, selector.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(elements)
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        as_bool(self.command(Method::GET, &Self::element_path(element, "displayed"), None).await?)
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool, AutomationError> {
        as_bool(self.command(Method::GET, &Self::element_path(element, "enabled"), None).await?)
    }

    async fn click(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.command(Method::POST, &Self::element_path(element, "click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), AutomationError> {
        self.command(Method::POST, &Self::element_path(element, "clear"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), AutomationError> {
        self.command(
            Method::POST,
            &Self::element_path(element, "value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, AutomationError> {
        as_string(self.command(Method::GET, &Self::element_path(element, "text"), None).await?)
    }

    async fn window_handles(&self) -> Result<Vec<String>, AutomationError> {
        let handles = self.command(Method::GET, "/window/handles", None).await?;
        Ok(handles
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default())
    }

    async fn current_window(&self) -> Result<String, AutomationError> {
        as_string(self.command(Method::GET, "/window", None).await?)
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), AutomationError> {
        self.command(Method::POST, "/window", Some(json!({ "handle": handle })))
            .await?;
        Ok(())
    }

    async fn switch_to_frame(&self, frame: Option<&ElementRef>) -> Result<(), AutomationError> {
        let id = match frame {
            Some(element) => json!({ ELEMENT_KEY: element.id }),
            None => Value::Null,
        };
        self.command(Method::POST, "/frame", Some(json!({ "id": id })))
            .await?;
        Ok(())
    }

    async fn alert_text(&self) -> Result<Option<String>, AutomationError> {
        match self.try_command(Method::GET, "/alert/text", None).await {
            Ok(value) => Ok(Some(as_string(value)?)),
            Err(CommandError::Remote { code, .. }) if code == "no such alert" => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn accept_alert(&self) -> Result<(), AutomationError> {
        self.command(Method::POST, "/alert/accept", Some(json!({})))
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AutomationError> {
        let encoded = as_string(self.command(Method::GET, "/screenshot", None).await?)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AutomationError::Driver(format!("invalid screenshot data: {e}")))
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        Self::send(&self.client, Method::DELETE, &url, None).await?;
        info!("Browser session {} closed", self.session_id);
        Ok(())
    }
}

/// Starts a fresh WebDriver session per launch.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    settings: BrowserSettings,
}

impl WebDriverLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DriverFactory for WebDriverLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserDriver>, AutomationError> {
        let client = WebDriverClient::start(&self.settings).await?;
        Ok(Arc::new(client))
    }
}
