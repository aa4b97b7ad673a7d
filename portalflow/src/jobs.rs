//! The unit of work a scheduled trigger runs: a whole backup in a fresh browser.

use crate::backup::{BackupManager, BackupStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::dates::DateRange;
use crate::driver::{BrowserDriver, DriverFactory};
use crate::pipeline::TaskRunner;
use crate::scheduler::{JobRunner, ScheduledJob};
use crate::session::{LoginOutcome, Session};
use crate::AutomationError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Launch, log in, back up the month so far, log out, prune, quit.
pub struct BackupJob {
    factory: Arc<dyn DriverFactory>,
    config: Config,
    secret: Option<String>,
    store: BackupStore,
}

impl BackupJob {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        config: Config,
        secret: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = BackupStore::new(config.backup.root.clone(), clock);
        Self {
            factory,
            config,
            secret,
            store,
        }
    }

    /// Everything between launch and quit. Returns whether the backup succeeded.
    async fn run_with(
        &self,
        driver: Arc<dyn BrowserDriver>,
        job: &ScheduledJob,
    ) -> Result<bool, AutomationError> {
        let mut session = Session::new(
            driver,
            Arc::new(self.config.layout()),
            self.config.login_settings(),
            self.config.diagnostics(),
        );

        if let LoginOutcome::Failed { diagnostic } = session.login(self.secret.as_deref(), false).await? {
            error!(
                "Login failed, skipping backup (screenshot: {})",
                diagnostic
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            return Ok(false);
        }

        let range = DateRange::month_to_date(self.store.clock().now().date_naive());
        let runner = TaskRunner::from_session(
            &session,
            self.config.download.directory.clone(),
            self.config.settle_times(),
            self.config.stage_timeouts(),
        );
        let manager = BackupManager::new(self.store.clone(), runner, self.config.backup.recent_files)
            .with_format(self.config.download.format);

        let succeeded = manager
            .run_kind(job.binding.kind, range, &job.binding.report_kinds)
            .await;

        if let Err(e) = session.logout().await {
            warn!("Logout after backup failed: {}", e);
        }

        match manager.cleanup_old_backups(self.config.backup.keep_days) {
            Ok(deleted) => info!("Retention removed {} old backup(s)", deleted),
            Err(e) => error!("Retention sweep failed: {}", e),
        }
        Ok(succeeded)
    }
}

#[async_trait]
impl JobRunner for BackupJob {
    #[instrument(skip(self, job), fields(job = job.id, kind = %job.binding.kind))]
    async fn run_job(&self, job: &ScheduledJob) {
        info!("============================================================");
        info!("Scheduled backup starting: {}", job);
        info!("============================================================");

        let driver = match self.factory.launch().await {
            Ok(driver) => driver,
            Err(e) => {
                error!("Could not start the browser: {}", e);
                return;
            }
        };

        match self.run_with(driver.clone(), job).await {
            Ok(true) => info!("Scheduled backup finished"),
            Ok(false) => warn!("Scheduled backup finished with failures"),
            Err(e) => error!("Scheduled backup aborted: {}", e),
        }

        if let Err(e) = driver.quit().await {
            warn!("Failed to close the browser: {}", e);
        }
    }
}
