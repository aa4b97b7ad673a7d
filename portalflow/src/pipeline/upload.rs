use super::{PipelineTask, Stage, StageTimeouts, TaskContext, TaskKind, TaskStep};
use crate::locator::Requirement;
use crate::AutomationError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::time::sleep;
use tracing::{info, warn};

/// What the portal's validation screen said about the selected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Passed,
    /// Explicit failure text; the upload is aborted
    Failed(String),
    /// Neither verdict appeared; the upload proceeds
    Unknown,
    /// No validate control on the page
    Skipped,
}

/// Select a claim file, optionally validate it, submit, and acknowledge the confirmation.
#[derive(Debug, Clone)]
pub struct UploadTask {
    file: PathBuf,
    validate: bool,
    verdict: Option<ValidationVerdict>,
    confirmation: Option<String>,
}

impl UploadTask {
    pub fn new(file: impl Into<PathBuf>, validate: bool) -> Self {
        Self {
            file: file.into(),
            validate,
            verdict: None,
            confirmation: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Set once Execute has run validation
    pub fn verdict(&self) -> Option<&ValidationVerdict> {
        self.verdict.as_ref()
    }

    /// Text of the confirmation dialog accepted during Collect
    pub fn confirmation(&self) -> Option<&str> {
        self.confirmation.as_deref()
    }

    async fn run_validation(&self, ctx: &TaskContext) -> Result<ValidationVerdict, AutomationError> {
        let button = ctx
            .resolver
            .resolve(&ctx.layout.validate_button, Requirement::Interactable)
            .await;
        let Some(button) = button.element() else {
            warn!("Validate button not found, skipping validation");
            return Ok(ValidationVerdict::Skipped);
        };

        ctx.driver.click(button).await?;
        info!("Validating {}", self.file.display());
        sleep(ctx.settle.validate).await;

        // Passed first: the failure texts also match "no errors" wording.
        if ctx.resolver.probe(&ctx.layout.validation_passed).await.is_some() {
            return Ok(ValidationVerdict::Passed);
        }
        if let Some(failure) = ctx.resolver.probe(&ctx.layout.validation_failed).await {
            let text = ctx
                .driver
                .text(&failure)
                .await
                .unwrap_or_else(|_| "validation reported errors".to_string());
            return Ok(ValidationVerdict::Failed(text));
        }
        Ok(ValidationVerdict::Unknown)
    }
}

#[async_trait]
impl PipelineTask for UploadTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Upload
    }

    fn describe(&self) -> String {
        format!("claim upload of {}", self.file.display())
    }

    fn steps(&self, timeouts: &StageTimeouts) -> Vec<TaskStep> {
        vec![
            TaskStep::new(Stage::Navigate, timeouts.navigate),
            // Nothing to submit without a selected file
            TaskStep::new(Stage::Configure, timeouts.configure).fatal(),
            TaskStep::new(Stage::Execute, timeouts.execute),
            TaskStep::new(Stage::Collect, timeouts.collect),
        ]
    }

    async fn navigate(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        ctx.open_menu(&ctx.layout.claim_upload_menu).await
    }

    async fn configure(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        if !self.file.is_file() {
            return Err(AutomationError::InvalidArgument(format!(
                "upload file does not exist: {}",
                self.file.display()
            )));
        }
        let absolute = std::fs::canonicalize(&self.file)?;

        let input = ctx
            .resolver
            .resolve(&ctx.layout.file_input, Requirement::Presence)
            .await
            .into_result()?;
        ctx.driver
            .send_keys(&input, &absolute.to_string_lossy())
            .await?;
        info!("Selected file {}", absolute.display());
        sleep(ctx.settle.click).await;
        Ok(())
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), AutomationError> {
        if self.validate {
            let verdict = self.run_validation(ctx).await?;
            info!("Validation verdict: {:?}", verdict);
            self.verdict = Some(verdict.clone());
            match verdict {
                ValidationVerdict::Failed(text) => {
                    return Err(AutomationError::ValidationFailed(text));
                }
                ValidationVerdict::Unknown => {
                    warn!("Validation gave no verdict, submitting anyway");
                }
                ValidationVerdict::Passed | ValidationVerdict::Skipped => {}
            }
        }

        ctx.resolver.click(&ctx.layout.submit_button).await?;
        info!("Submitted {}", self.file.display());
        sleep(ctx.settle.submit).await;
        Ok(())
    }

    async fn collect(&mut self, ctx: &TaskContext) -> Result<Vec<PathBuf>, AutomationError> {
        if let Some(text) = ctx.driver.alert_text().await? {
            info!("Confirmation dialog: {}", text);
            ctx.driver.accept_alert().await?;
            self.confirmation = Some(text);
        }
        Ok(vec![self.file.clone()])
    }
}
