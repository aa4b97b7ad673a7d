use super::{
    run_pipeline, DownloadTask, FileFormat, PipelineTask, ReportTask, SettleTimes, StageTimeouts,
    TaskContext, TaskResult, UploadTask,
};
use crate::dates::DateRange;
use crate::session::Session;
use crate::AutomationError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Runs tasks one after another against a single session's driver.
#[derive(Clone)]
pub struct TaskRunner {
    ctx: TaskContext,
}

impl TaskRunner {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    /// Borrow the session's driver, resolver, layout and diagnostics.
    pub fn from_session(
        session: &Session,
        download_dir: impl Into<PathBuf>,
        settle: SettleTimes,
        timeouts: StageTimeouts,
    ) -> Self {
        Self::new(TaskContext {
            driver: session.driver().clone(),
            resolver: session.resolver().clone(),
            layout: session.layout().clone(),
            download_dir: download_dir.into(),
            diagnostics: session.diagnostics().clone(),
            settle,
            timeouts,
        })
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn download_dir(&self) -> &Path {
        &self.ctx.download_dir
    }

    pub async fn run(&self, task: &mut dyn PipelineTask) -> TaskResult {
        run_pipeline(&self.ctx, task).await
    }

    pub async fn download(&self, range: DateRange, format: FileFormat) -> TaskResult {
        self.run(&mut DownloadTask::new(range, format)).await
    }

    pub async fn download_month(
        &self,
        year: i32,
        month: u32,
        format: FileFormat,
    ) -> Result<TaskResult, AutomationError> {
        let mut task = DownloadTask::for_month(year, month, format)?;
        Ok(self.run(&mut task).await)
    }

    pub async fn upload(&self, file: &Path, validate: bool) -> TaskResult {
        self.run(&mut UploadTask::new(file, validate)).await
    }

    /// Upload files in order; one file failing does not stop the rest.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn upload_many(&self, files: &[PathBuf], validate: bool) -> BTreeMap<PathBuf, TaskResult> {
        let mut results = BTreeMap::new();
        for (i, file) in files.iter().enumerate() {
            info!("Uploading file {}/{}: {}", i + 1, files.len(), file.display());
            let result = self.upload(file, validate).await;
            results.insert(file.clone(), result);
        }
        let succeeded = results.values().filter(|r| r.success).count();
        info!("Uploads finished: {}/{} succeeded", succeeded, files.len());
        results
    }

    pub async fn report(&self, report_kind: &str, range: DateRange, format: FileFormat) -> TaskResult {
        self.run(&mut ReportTask::new(report_kind, range, format)).await
    }

    /// Every report kind for one calendar month, sequentially.
    #[instrument(skip(self, kinds))]
    pub async fn monthly_reports(
        &self,
        year: i32,
        month: u32,
        kinds: &[String],
        format: FileFormat,
    ) -> Result<BTreeMap<String, TaskResult>, AutomationError> {
        let range = DateRange::month(year, month)?;
        let mut results = BTreeMap::new();
        for kind in kinds {
            let result = self.report(kind, range, format).await;
            results.insert(kind.clone(), result);
        }
        let succeeded = results.values().filter(|r| r.success).count();
        info!("Monthly reports finished: {}/{} succeeded", succeeded, kinds.len());
        Ok(results)
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn upload_candidates(dir: &Path) -> Result<Vec<PathBuf>, AutomationError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
