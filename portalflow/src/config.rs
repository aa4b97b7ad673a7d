//! YAML configuration and secret resolution.

use crate::backup::BackupKind;
use crate::diagnostics::Diagnostics;
use crate::pipeline::{FileFormat, SettleTimes, StageTimeouts};
use crate::portal::{PortalLayout, DEFAULT_PORTAL_URL};
use crate::scheduler::{parse_time, parse_weekday, JobBinding, Scheduler};
use crate::session::LoginSettings;
use crate::AutomationError;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
/// Environment variable holding the credential secret
pub const SECRET_ENV: &str = "CERT_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(alias = "selenium")]
    pub browser: BrowserSettings,
    pub download: DownloadConfig,
    pub upload: UploadConfig,
    pub login: LoginConfig,
    pub backup: BackupConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub url: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PORTAL_URL.to_string(),
        }
    }
}

/// How to reach and start the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub webdriver_url: String,
    pub browser: String,
    pub user_agent: Option<String>,
    /// Filled from `download.directory` when the driver is launched
    #[serde(skip)]
    pub download_dir: PathBuf,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            webdriver_url: "http://localhost:9515".to_string(),
            browser: "chrome".to_string(),
            user_agent: None,
            download_dir: PathBuf::from("data/downloads"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub format: FileFormat,
    /// Seconds to wait for a download to land
    pub wait_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/downloads"),
            format: FileFormat::Excel,
            wait_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub validate_before_upload: bool,
    pub directory: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            validate_before_upload: true,
            directory: PathBuf::from("data/uploads"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub cert_password: Option<String>,
    pub timeout_secs: u64,
    pub manual_window_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            cert_password: None,
            timeout_secs: 60,
            manual_window_secs: 240,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub root: PathBuf,
    pub report_types: Vec<String>,
    pub keep_days: u32,
    pub recent_files: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/backups"),
            report_types: Vec::new(),
            keep_days: 30,
            recent_files: 10,
        }
    }
}

/// `day` of a trigger: a weekday name for weekly jobs, 1-31 for monthly ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaySpec {
    Number(u32),
    Name(String),
}

/// One recurring trigger. Unset times fall back to 02:00, 03:00 and 04:00
/// for the daily, weekly and monthly triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub kind: BackupKind,
    pub day: Option<DaySpec>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            time: None,
            kind: BackupKind::Full,
            day: None,
        }
    }
}

impl TriggerConfig {
    fn time_or(&self, fallback: &str) -> Result<NaiveTime, AutomationError> {
        parse_time(self.time.as_deref().unwrap_or(fallback))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    pub daily_backup: TriggerConfig,
    pub weekly_backup: TriggerConfig,
    pub monthly_backup: TriggerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            daily_backup: TriggerConfig::default(),
            weekly_backup: TriggerConfig::default(),
            monthly_backup: TriggerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub directory: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load a YAML file. A missing file yields the defaults with a warning.
    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AutomationError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        let config = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&text)
                .map_err(|e| AutomationError::Config(format!("{}: {e}", path.display())))?
        };
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AutomationError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| AutomationError::Config(e.to_string()))
    }

    /// The credential secret: a non-empty config value wins over the environment.
    pub fn resolve_secret(&self, env_value: Option<String>) -> Option<String> {
        let from_config = self
            .login
            .cert_password
            .as_ref()
            .filter(|secret| !secret.trim().is_empty())
            .cloned();
        let secret = from_config.or_else(|| env_value.filter(|secret| !secret.trim().is_empty()));
        if secret.is_none() {
            warn!(
                "No credential secret configured; set {} or login.cert_password, or finish the prompt by hand",
                SECRET_ENV
            );
        }
        secret
    }

    /// Secret lookup against the process environment.
    pub fn secret(&self) -> Option<String> {
        self.resolve_secret(std::env::var(SECRET_ENV).ok())
    }

    /// Browser settings with the download directory filled in.
    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            download_dir: self.download.directory.clone(),
            ..self.browser.clone()
        }
    }

    pub fn login_settings(&self) -> LoginSettings {
        LoginSettings {
            timeout: Duration::from_secs(self.login.timeout_secs),
            manual_window: Duration::from_secs(self.login.manual_window_secs),
            ..LoginSettings::default()
        }
    }

    pub fn stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            download_wait: Duration::from_secs(self.download.wait_secs),
            ..StageTimeouts::default()
        }
    }

    pub fn settle_times(&self) -> SettleTimes {
        SettleTimes::default()
    }

    pub fn layout(&self) -> PortalLayout {
        PortalLayout::new(self.portal.url.clone())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.diagnostics.directory.clone())
    }

    /// Register every enabled trigger on `scheduler`. Returns the number registered.
    pub fn register_jobs(&self, scheduler: &mut Scheduler) -> Result<usize, AutomationError> {
        let report_kinds = &self.backup.report_types;
        let mut registered = 0;

        let daily = &self.scheduler.daily_backup;
        if daily.enabled {
            let binding = JobBinding::new(daily.kind, report_kinds.clone());
            scheduler.schedule_daily(daily.time_or("02:00")?, binding);
            registered += 1;
        }

        let weekly = &self.scheduler.weekly_backup;
        if weekly.enabled {
            let day = match &weekly.day {
                Some(DaySpec::Name(name)) => parse_weekday(name)?,
                None => Weekday::Mon,
                Some(DaySpec::Number(n)) => {
                    return Err(AutomationError::Config(format!(
                        "weekly_backup.day must be a weekday name, got {n}"
                    )))
                }
            };
            let binding = JobBinding::new(weekly.kind, report_kinds.clone());
            scheduler.schedule_weekly(day, weekly.time_or("03:00")?, binding);
            registered += 1;
        }

        let monthly = &self.scheduler.monthly_backup;
        if monthly.enabled {
            let day = match &monthly.day {
                Some(DaySpec::Number(n)) => *n,
                Some(DaySpec::Name(s)) => s.trim().parse().map_err(|_| {
                    AutomationError::Config(format!("invalid monthly_backup.day '{s}'"))
                })?,
                None => 1,
            };
            let binding = JobBinding::new(monthly.kind, report_kinds.clone());
            scheduler.schedule_monthly(day, monthly.time_or("04:00")?, binding)?;
            registered += 1;
        }

        Ok(registered)
    }
}
