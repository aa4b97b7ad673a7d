use super::{FileFormat, PipelineTask, StageTimeouts, TaskContext, TaskKind, TaskStep};
use crate::dates::DateRange;
use crate::AutomationError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::time::sleep;
use tracing::info;

/// Search claims over a date range and download the result list.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    range: DateRange,
    format: FileFormat,
}

impl DownloadTask {
    pub fn new(range: DateRange, format: FileFormat) -> Self {
        Self { range, format }
    }

    /// Whole calendar month, first to last day.
    pub fn for_month(year: i32, month: u32, format: FileFormat) -> Result<Self, AutomationError> {
        Ok(Self::new(DateRange::month(year, month)?, format))
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }
}

#[async_trait]
impl PipelineTask for DownloadTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn describe(&self) -> String {
        format!("claim download {} as {}", self.range, self.format)
    }

    fn steps(&self, timeouts: &StageTimeouts) -> Vec<TaskStep> {
        timeouts.standard_steps()
    }

    async fn navigate(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        ctx.open_menu(&ctx.layout.claim_inquiry_menu).await
    }

    async fn configure(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        let (start, end) = self.range.compact();
        let start_set = ctx.fill_optional(&ctx.layout.claim_start_date, &start).await;
        let end_set = ctx.fill_optional(&ctx.layout.claim_end_date, &end).await;
        if !start_set && !end_set {
            return Err(AutomationError::LocatorNotFound(
                "no date field accepted the search range".to_string(),
            ));
        }
        info!("Search range set: {}", self.range);
        Ok(())
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        ctx.resolver.click(&ctx.layout.search_button).await?;
        info!("Searching claims");
        sleep(ctx.settle.search).await;
        Ok(())
    }

    async fn collect(&mut self, ctx: &TaskContext) -> Result<Vec<PathBuf>, AutomationError> {
        let control = ctx.layout.claim_download_button(self.format);
        ctx.retrieve_download(&control).await
    }
}
