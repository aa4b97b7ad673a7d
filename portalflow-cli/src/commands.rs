//! Subcommand bodies. Each one owns a browser for its duration and always quits it.

use crate::output;
use anyhow::{bail, Context, Result};
use portalflow::pipeline::upload_candidates;
use portalflow::{
    BackupJob, BackupManager, BackupStore, BrowserDriver, Clock, Config, DateRange, DriverFactory,
    FileFormat, LoginOutcome, Scheduler, Session, SystemClock, TaskRunner, WebDriverLauncher,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Loaded configuration plus the resolved credential secret.
pub struct App {
    pub config: Config,
    pub secret: Option<String>,
    clock: Arc<dyn Clock>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let secret = config.secret();
        Self {
            config,
            secret,
            clock: Arc::new(SystemClock),
        }
    }

    fn today(&self) -> chrono::NaiveDate {
        self.clock.now().date_naive()
    }

    fn store(&self) -> BackupStore {
        BackupStore::new(self.config.backup.root.clone(), self.clock.clone())
    }

    fn launcher(&self) -> Arc<WebDriverLauncher> {
        Arc::new(WebDriverLauncher::new(self.config.browser_settings()))
    }

    /// Launch a browser and log in. `None` means the login itself failed;
    /// the browser is already closed in that case.
    async fn open_session(&self, wait_for_manual: bool) -> Result<Option<Session>> {
        let driver = self
            .launcher()
            .launch()
            .await
            .context("Failed to start the browser")?;

        let mut session = Session::new(
            driver.clone(),
            Arc::new(self.config.layout()),
            self.config.login_settings(),
            self.config.diagnostics(),
        );

        match session.login(self.secret.as_deref(), wait_for_manual).await {
            Ok(LoginOutcome::Authenticated) => Ok(Some(session)),
            Ok(LoginOutcome::Failed { diagnostic }) => {
                error!("Login failed");
                if let Some(path) = diagnostic {
                    error!("Screenshot saved to {}", path.display());
                }
                quit(driver.as_ref()).await;
                Ok(None)
            }
            Err(e) => {
                quit(driver.as_ref()).await;
                Err(e).context("Login aborted")
            }
        }
    }

    fn runner(&self, session: &Session) -> TaskRunner {
        TaskRunner::from_session(
            session,
            self.config.download.directory.clone(),
            self.config.settle_times(),
            self.config.stage_timeouts(),
        )
    }

    /// Log in with a manual window, wait for the operator, log out.
    pub async fn test_login(&self) -> Result<bool> {
        banner("Login test");
        let Some(mut session) = self.open_session(true).await? else {
            return Ok(false);
        };
        info!("Login succeeded");

        println!("\nPress Enter to log out...");
        let _ = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)
        })
        .await;

        close(&mut session).await;
        Ok(true)
    }

    pub async fn download(&self, range: DateRange, format: Option<FileFormat>) -> Result<bool> {
        banner("Claim download");
        let format = format.unwrap_or(self.config.download.format);
        let Some(mut session) = self.open_session(true).await? else {
            return Ok(false);
        };

        let result = self.runner(&session).download(range, format).await;
        close(&mut session).await;

        output::task(&format!("claim download {range} ({format})"), &result);
        Ok(result.success)
    }

    pub async fn upload(&self, files: Vec<PathBuf>, validate: bool) -> Result<bool> {
        banner("Claim upload");
        if files.is_empty() {
            warn!("No files to upload");
            return Ok(false);
        }
        let Some(mut session) = self.open_session(true).await? else {
            return Ok(false);
        };

        let runner = self.runner(&session);
        let results: BTreeMap<String, _> = if let [file] = files.as_slice() {
            let result = runner.upload(file, validate).await;
            BTreeMap::from([(file.display().to_string(), result)])
        } else {
            runner
                .upload_many(&files, validate)
                .await
                .into_iter()
                .map(|(path, result)| (path.display().to_string(), result))
                .collect()
        };
        close(&mut session).await;

        output::task_map("claim upload", &results);
        Ok(results.values().all(|r| r.success))
    }

    /// One report per kind over `range`, or the monthly batch when `month` is set.
    pub async fn report(
        &self,
        kinds: Vec<String>,
        range: DateRange,
        month: Option<(i32, u32)>,
        format: Option<FileFormat>,
    ) -> Result<bool> {
        banner("Report generation");
        let kinds = if kinds.is_empty() {
            self.config.backup.report_types.clone()
        } else {
            kinds
        };
        if kinds.is_empty() {
            bail!("No report type given and backup.report_types is empty");
        }
        let format = format.unwrap_or(self.config.download.format);

        let Some(mut session) = self.open_session(true).await? else {
            return Ok(false);
        };
        let runner = self.runner(&session);
        let results = match month {
            Some((year, month)) => runner.monthly_reports(year, month, &kinds, format).await,
            None => {
                let mut results = BTreeMap::new();
                for kind in &kinds {
                    results.insert(kind.clone(), runner.report(kind, range, format).await);
                }
                Ok(results)
            }
        };
        close(&mut session).await;

        let results = results.context("Invalid report month")?;
        output::task_map(&format!("reports {range}"), &results);
        Ok(results.values().all(|r| r.success))
    }

    /// One unattended full backup.
    pub async fn backup(&self, range: DateRange) -> Result<bool> {
        banner("Full backup");
        let Some(mut session) = self.open_session(false).await? else {
            return Ok(false);
        };

        let manager = BackupManager::new(
            self.store(),
            self.runner(&session),
            self.config.backup.recent_files,
        )
        .with_format(self.config.download.format);
        let summary = manager
            .full_backup(range, &self.config.backup.report_types)
            .await;
        close(&mut session).await;

        let summary = summary.context("Full backup could not start")?;
        output::full_backup(&summary);
        Ok(summary.success)
    }

    /// Register configured jobs and poll until Ctrl-C.
    pub async fn scheduler(&self) -> Result<bool> {
        banner("Scheduler");
        let mut scheduler = Scheduler::new(self.clock.clone()).with_poll_interval(
            Duration::from_secs(self.config.scheduler.poll_interval_secs.max(1)),
        );
        let registered = self
            .config
            .register_jobs(&mut scheduler)
            .context("Invalid scheduler configuration")?;
        if registered == 0 {
            warn!("No scheduled backups are enabled in the configuration");
        }
        output::jobs(scheduler.list_jobs());

        let job = BackupJob::new(
            self.launcher(),
            self.config.clone(),
            self.secret.clone(),
            self.clock.clone(),
        );

        let stop = scheduler.stop_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current job");
                stop.stop();
            }
        });

        scheduler.run(&job).await;
        Ok(true)
    }

    pub fn list_backups(&self, json: bool) -> Result<bool> {
        let records = self.store().list_backups().context("Failed to list backups")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else {
            output::backups(&records);
        }
        Ok(true)
    }

    pub fn cleanup(&self, keep_days: Option<u32>) -> Result<bool> {
        let keep_days = keep_days.unwrap_or(self.config.backup.keep_days);
        let report = self
            .store()
            .sweep(keep_days)
            .context("Failed to scan the backup root")?;
        output::retention(&report, keep_days);
        Ok(report.failures.is_empty())
    }

    /// Default range for commands given neither bounds nor a month.
    pub fn range(&self, start: Option<&str>, end: Option<&str>) -> Result<DateRange> {
        DateRange::from_bounds(start, end, self.today()).context("Invalid date range")
    }
}

fn banner(title: &str) {
    info!("============================================================");
    info!("{}", title);
    info!("============================================================");
}

async fn close(session: &mut Session) {
    if let Err(e) = session.logout().await {
        warn!("Logout failed: {}", e);
    }
    quit(session.driver().as_ref()).await;
}

async fn quit(driver: &dyn BrowserDriver) {
    if let Err(e) = driver.quit().await {
        warn!("Failed to close the browser: {}", e);
    }
}

/// Files directly inside an upload directory.
pub fn files_in(dir: &std::path::Path) -> Result<Vec<PathBuf>> {
    upload_candidates(dir).with_context(|| format!("Cannot read upload directory {}", dir.display()))
}
