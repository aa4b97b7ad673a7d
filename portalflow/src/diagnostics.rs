use crate::driver::BrowserDriver;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Writes postmortem screenshots for failed logins and aborted pipelines.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dir: PathBuf,
}

impl Diagnostics {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a screenshot as `<label>_<timestamp>.png`.
    ///
    /// Capture problems are logged and swallowed; a missing screenshot never
    /// changes the outcome being diagnosed.
    pub async fn capture(&self, driver: &dyn BrowserDriver, label: &str) -> Option<PathBuf> {
        let png = match driver.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                error!("Failed to take screenshot for '{}': {}", label, e);
                return None;
            }
        };

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            error!("Failed to create diagnostics directory {:?}: {}", self.dir, e);
            return None;
        }

        let stamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        let path = self.dir.join(format!("{label}_{stamp}.png"));
        match std::fs::write(&path, png) {
            Ok(()) => {
                info!("Saved screenshot: {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save screenshot {}: {}", path.display(), e);
                None
            }
        }
    }
}
