//! The generic Navigate -> Configure -> Execute -> Collect task pipeline.
//!
//! Concrete tasks ([`DownloadTask`], [`UploadTask`], [`ReportTask`]) declare
//! their plan as a list of [`TaskStep`]s and implement one body per stage.
//! [`run_pipeline`] drives the plan, bounds every stage with its timeout and
//! turns the first fatal failure into a failed [`TaskResult`] with a screenshot.

mod download;
mod report;
mod runner;
mod upload;

pub use download::DownloadTask;
pub use report::ReportTask;
pub use runner::{upload_candidates, TaskRunner};
pub use upload::{UploadTask, ValidationVerdict};

use crate::diagnostics::Diagnostics;
use crate::downloads::DownloadWatcher;
use crate::driver::BrowserDriver;
use crate::locator::{Locator, LocatorResolver};
use crate::portal::PortalLayout;
use crate::AutomationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Pause between retries of a failed stage
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Download,
    Upload,
    Report,
}

impl TaskKind {
    /// Prefix for diagnostic screenshots of aborted runs
    pub fn error_label(self) -> &'static str {
        match self {
            TaskKind::Download => "download_error",
            TaskKind::Upload => "upload_error",
            TaskKind::Report => "report_error",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Download => "download",
            TaskKind::Upload => "upload",
            TaskKind::Report => "report",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Navigate,
    Configure,
    Execute,
    Collect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// File format offered by the portal's download controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Excel,
    Pdf,
    Csv,
}

impl FileFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FileFormat::Excel => "excel",
            FileFormat::Pdf => "pdf",
            FileFormat::Csv => "csv",
        }
    }

    /// Button caption the portal uses for this format
    pub fn label(self) -> &'static str {
        match self {
            FileFormat::Excel => "엑셀",
            FileFormat::Pdf => "PDF",
            FileFormat::Csv => "CSV",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excel" | "xlsx" | "xls" => Ok(FileFormat::Excel),
            "pdf" => Ok(FileFormat::Pdf),
            "csv" => Ok(FileFormat::Csv),
            other => Err(AutomationError::InvalidArgument(format!(
                "unknown file format '{other}' (expected excel, pdf or csv)"
            ))),
        }
    }
}

/// One stage of a task's plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStep {
    pub stage: Stage,
    pub timeout: Duration,
    /// A fatal failure aborts the run; otherwise it is logged and the run continues
    pub fatal: bool,
    /// Extra attempts before the failure counts
    pub retries: u32,
}

impl TaskStep {
    /// A step with the stage's default fatality: only Configure is skippable.
    pub fn new(stage: Stage, timeout: Duration) -> Self {
        Self {
            stage,
            timeout,
            fatal: stage != Stage::Configure,
            retries: 0,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Navigate and Execute ignore this and stay fatal.
    pub fn skippable(mut self) -> Self {
        self.fatal = false;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Navigate and Execute are fatal whatever the plan says.
    pub fn is_fatal(&self) -> bool {
        self.fatal || matches!(self.stage, Stage::Navigate | Stage::Execute)
    }
}

/// Outcome of one pipeline run. Built once by [`run_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub kind: TaskKind,
    pub success: bool,
    pub artifacts: Vec<PathBuf>,
    pub diagnostic: Option<PathBuf>,
    pub error: Option<String>,
}

impl TaskResult {
    fn succeeded(kind: TaskKind, artifacts: Vec<PathBuf>) -> Self {
        Self {
            kind,
            success: true,
            artifacts,
            diagnostic: None,
            error: None,
        }
    }

    fn failed(kind: TaskKind, error: String, diagnostic: Option<PathBuf>) -> Self {
        Self {
            kind,
            success: false,
            artifacts: Vec::new(),
            diagnostic,
            error: Some(error),
        }
    }
}

/// Fixed waits after portal actions, long enough for the page to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleTimes {
    pub click: Duration,
    pub search: Duration,
    pub validate: Duration,
    pub generate: Duration,
    pub submit: Duration,
    pub download: Duration,
}

impl Default for SettleTimes {
    fn default() -> Self {
        Self {
            click: Duration::from_secs(2),
            search: Duration::from_secs(3),
            validate: Duration::from_secs(5),
            generate: Duration::from_secs(5),
            submit: Duration::from_secs(3),
            download: Duration::from_secs(5),
        }
    }
}

/// Per-stage bounds and download polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub navigate: Duration,
    pub configure: Duration,
    pub execute: Duration,
    pub collect: Duration,
    /// How long Collect waits for a file to land
    pub download_wait: Duration,
    pub download_poll: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            navigate: Duration::from_secs(60),
            configure: Duration::from_secs(60),
            execute: Duration::from_secs(120),
            collect: Duration::from_secs(180),
            download_wait: Duration::from_secs(60),
            download_poll: Duration::from_millis(500),
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Navigate => self.navigate,
            Stage::Configure => self.configure,
            Stage::Execute => self.execute,
            Stage::Collect => self.collect,
        }
    }

    /// The four stages in order, with their default fatality.
    pub fn standard_steps(&self) -> Vec<TaskStep> {
        [Stage::Navigate, Stage::Configure, Stage::Execute, Stage::Collect]
            .into_iter()
            .map(|stage| TaskStep::new(stage, self.for_stage(stage)))
            .collect()
    }
}

/// Everything a task body needs to drive the portal.
#[derive(Clone)]
pub struct TaskContext {
    pub driver: Arc<dyn BrowserDriver>,
    pub resolver: LocatorResolver,
    pub layout: Arc<PortalLayout>,
    pub download_dir: PathBuf,
    pub diagnostics: Diagnostics,
    pub settle: SettleTimes,
    pub timeouts: StageTimeouts,
}

impl TaskContext {
    /// Click the first matching menu entry and let the page settle.
    pub async fn open_menu(&self, menu: &Locator) -> Result<(), AutomationError> {
        self.resolver.click(menu).await?;
        info!("Opened {}", menu.name());
        sleep(self.settle.click).await;
        Ok(())
    }

    /// Fill an optional form field. A missing field is a warning.
    pub async fn fill_optional(&self, field: &Locator, value: &str) -> bool {
        match self.resolver.fill(field, value).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Optional field '{}' not set: {}", field.name(), e);
                false
            }
        }
    }

    /// Click a retrieval control and wait for its file to land in the download directory.
    pub async fn retrieve_download(&self, control: &Locator) -> Result<Vec<PathBuf>, AutomationError> {
        let watcher = DownloadWatcher::snapshot(&self.download_dir)?;
        self.resolver.click(control).await?;
        info!("Clicked {}", control.name());
        sleep(self.settle.download).await;

        let files = watcher
            .wait_for_new(self.timeouts.download_wait, self.timeouts.download_poll)
            .await?;
        if files.is_empty() {
            return Err(AutomationError::Timeout(format!(
                "no file landed in {} within {:?}",
                self.download_dir.display(),
                self.timeouts.download_wait
            )));
        }
        for file in &files {
            info!("Downloaded {}", file.display());
        }
        Ok(files)
    }
}

/// A concrete task: a plan plus one body per stage.
#[async_trait]
pub trait PipelineTask: Send {
    fn kind(&self) -> TaskKind;

    /// Short human description for logs
    fn describe(&self) -> String;

    fn steps(&self, timeouts: &StageTimeouts) -> Vec<TaskStep>;

    /// Whether a run may succeed without collecting anything
    fn allows_empty_artifacts(&self) -> bool {
        false
    }

    async fn navigate(&mut self, ctx: &TaskContext) -> Result<(), AutomationError>;

    async fn configure(&mut self, ctx: &TaskContext) -> Result<(), AutomationError>;

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), AutomationError>;

    async fn collect(&mut self, ctx: &TaskContext) -> Result<Vec<PathBuf>, AutomationError>;
}

async fn run_stage(
    task: &mut dyn PipelineTask,
    ctx: &TaskContext,
    stage: Stage,
) -> Result<Vec<PathBuf>, AutomationError> {
    match stage {
        Stage::Navigate => task.navigate(ctx).await.map(|_| Vec::new()),
        Stage::Configure => task.configure(ctx).await.map(|_| Vec::new()),
        Stage::Execute => task.execute(ctx).await.map(|_| Vec::new()),
        Stage::Collect => task.collect(ctx).await,
    }
}

async fn run_step(
    task: &mut dyn PipelineTask,
    ctx: &TaskContext,
    step: &TaskStep,
) -> Result<Vec<PathBuf>, AutomationError> {
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(step.timeout, run_stage(task, ctx, step.stage)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AutomationError::Timeout(format!(
                "{} stage exceeded {:?}",
                step.stage, step.timeout
            ))),
        };
        match outcome {
            Ok(artifacts) => return Ok(artifacts),
            Err(e) if attempt < step.retries => {
                attempt += 1;
                warn!(
                    "{} stage failed on attempt {}/{}: {}. Retrying...",
                    step.stage, attempt, step.retries, e
                );
                sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run a task's plan in order and produce its single [`TaskResult`].
///
/// Stops at the first fatal failure: later stages are never invoked, a
/// `<kind>_error` screenshot is captured and the result carries no artifacts.
#[instrument(skip_all, fields(kind = %task.kind()))]
pub async fn run_pipeline(ctx: &TaskContext, task: &mut dyn PipelineTask) -> TaskResult {
    let kind = task.kind();
    info!("Starting {}", task.describe());

    let mut artifacts = Vec::new();
    for step in task.steps(&ctx.timeouts) {
        match run_step(task, ctx, &step).await {
            Ok(mut produced) => artifacts.append(&mut produced),
            Err(e) if step.is_fatal() => {
                error!("{} stage failed, aborting {}: {}", step.stage, kind, e);
                return abort(ctx, kind, format!("{} stage: {e}", step.stage)).await;
            }
            Err(e) => warn!("{} stage failed, continuing: {}", step.stage, e),
        }
    }

    if artifacts.is_empty() && !task.allows_empty_artifacts() {
        error!("{} finished without collecting any file", kind);
        return abort(ctx, kind, "no artifacts collected".to_string()).await;
    }

    info!("Finished {} with {} artifact(s)", task.describe(), artifacts.len());
    TaskResult::succeeded(kind, artifacts)
}

async fn abort(ctx: &TaskContext, kind: TaskKind, error: String) -> TaskResult {
    let diagnostic = ctx
        .diagnostics
        .capture(ctx.driver.as_ref(), kind.error_label())
        .await;
    TaskResult::failed(kind, error, diagnostic)
}
