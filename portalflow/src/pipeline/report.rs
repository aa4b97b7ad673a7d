use super::{FileFormat, PipelineTask, StageTimeouts, TaskContext, TaskKind, TaskStep};
use crate::dates::DateRange;
use crate::AutomationError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::time::sleep;
use tracing::{info, warn};

/// Generate one statistics report for a period and download it.
#[derive(Debug, Clone)]
pub struct ReportTask {
    report_kind: String,
    range: DateRange,
    format: FileFormat,
}

impl ReportTask {
    pub fn new(report_kind: impl Into<String>, range: DateRange, format: FileFormat) -> Self {
        Self {
            report_kind: report_kind.into(),
            range,
            format,
        }
    }

    pub fn report_kind(&self) -> &str {
        &self.report_kind
    }

    pub fn range(&self) -> DateRange {
        self.range
    }
}

#[async_trait]
impl PipelineTask for ReportTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Report
    }

    fn describe(&self) -> String {
        format!("report '{}' for {}", self.report_kind, self.range)
    }

    fn steps(&self, timeouts: &StageTimeouts) -> Vec<TaskStep> {
        timeouts.standard_steps()
    }

    async fn navigate(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        ctx.open_menu(&ctx.layout.statistics_menu).await
    }

    async fn configure(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        let option = ctx.layout.report_kind_option(&self.report_kind);
        match ctx.resolver.click(&option).await {
            Ok(_) => {
                info!("Selected report kind '{}'", self.report_kind);
                sleep(ctx.settle.click).await;
            }
            Err(e) => warn!("Report kind '{}' not selectable: {}", self.report_kind, e),
        }

        let (start, end) = self.range.compact();
        let start_set = ctx.fill_optional(&ctx.layout.report_start_date, &start).await;
        let end_set = ctx.fill_optional(&ctx.layout.report_end_date, &end).await;
        if !start_set && !end_set {
            return Err(AutomationError::LocatorNotFound(
                "no date field accepted the report period".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        ctx.resolver.click(&ctx.layout.generate_button).await?;
        info!("Generating report '{}'", self.report_kind);
        sleep(ctx.settle.generate).await;
        Ok(())
    }

    async fn collect(&mut self, ctx: &TaskContext) -> Result<Vec<PathBuf>, AutomationError> {
        let control = ctx.layout.report_download_button(self.format);
        ctx.retrieve_download(&control).await
    }
}
