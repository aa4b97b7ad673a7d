use super::fake_driver::{ClickEffect, FakeDriver};
use super::{init_tracing, screenshots_in, task_context};
use crate::pipeline::{
    run_pipeline, FileFormat, PipelineTask, Stage, StageTimeouts, TaskContext, TaskKind,
    TaskRunner, TaskStep, UploadTask, ValidationVerdict,
};
use crate::portal::PortalLayout;
use crate::AutomationError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Scripted task that records which stage bodies ran.
#[derive(Default)]
struct RecordingTask {
    calls: Vec<Stage>,
    fail_at: Option<Stage>,
    hang_at: Option<Stage>,
    /// Execute fails this many times before succeeding
    flaky_execute: u32,
    execute_retries: u32,
    configure_fatal: bool,
    allow_empty: bool,
    artifacts: Vec<PathBuf>,
}

impl RecordingTask {
    fn producing(artifact: &str) -> Self {
        Self {
            artifacts: vec![PathBuf::from(artifact)],
            ..Default::default()
        }
    }

    async fn enter(&mut self, stage: Stage) -> Result<(), AutomationError> {
        self.calls.push(stage);
        if self.hang_at == Some(stage) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_at == Some(stage) {
            return Err(AutomationError::Driver(format!("{stage} broke")));
        }
        Ok(())
    }

    fn count(&self, stage: Stage) -> usize {
        self.calls.iter().filter(|s| **s == stage).count()
    }
}

#[async_trait]
impl PipelineTask for RecordingTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Download
    }

    fn describe(&self) -> String {
        "recording task".to_string()
    }

    fn steps(&self, timeouts: &StageTimeouts) -> Vec<TaskStep> {
        let mut steps = timeouts.standard_steps();
        steps[1].fatal = self.configure_fatal;
        steps[2].retries = self.execute_retries;
        steps[2].timeout = Duration::from_secs(10);
        steps
    }

    fn allows_empty_artifacts(&self) -> bool {
        self.allow_empty
    }

    async fn navigate(&mut self, _ctx: &TaskContext) -> Result<(), AutomationError> {
        self.enter(Stage::Navigate).await
    }

    async fn configure(&mut self, _ctx: &TaskContext) -> Result<(), AutomationError> {
        self.enter(Stage::Configure).await
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<(), AutomationError> {
        self.enter(Stage::Execute).await?;
        if self.flaky_execute > 0 {
            self.flaky_execute -= 1;
            return Err(AutomationError::Driver("stale element".to_string()));
        }
        Ok(())
    }

    async fn collect(&mut self, _ctx: &TaskContext) -> Result<Vec<PathBuf>, AutomationError> {
        self.enter(Stage::Collect).await?;
        Ok(self.artifacts.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn test_navigate_failure_skips_remaining_stages() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let driver = FakeDriver::new();
    let ctx = task_context(driver.clone(), root.path());
    let mut task = RecordingTask {
        fail_at: Some(Stage::Navigate),
        ..RecordingTask::producing("claims.xlsx")
    };

    let result = run_pipeline(&ctx, &mut task).await;

    assert!(!result.success);
    assert!(result.artifacts.is_empty());
    assert_eq!(task.calls, vec![Stage::Navigate]);
    assert!(result.error.unwrap().contains("Navigate"));
    let diagnostic = result.diagnostic.expect("screenshot on abort");
    assert!(diagnostic
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("download_error_"));
    assert_eq!(screenshots_in(&root.path().join("logs")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_skippable_configure_failure_continues() {
    let root = TempDir::new().unwrap();
    let ctx = task_context(FakeDriver::new(), root.path());
    let mut task = RecordingTask {
        fail_at: Some(Stage::Configure),
        ..RecordingTask::producing("claims.xlsx")
    };

    let result = run_pipeline(&ctx, &mut task).await;

    assert!(result.success);
    assert_eq!(result.artifacts, vec![PathBuf::from("claims.xlsx")]);
    assert_eq!(
        task.calls,
        vec![Stage::Navigate, Stage::Configure, Stage::Execute, Stage::Collect]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fatal_configure_failure_aborts() {
    let root = TempDir::new().unwrap();
    let ctx = task_context(FakeDriver::new(), root.path());
    let mut task = RecordingTask {
        fail_at: Some(Stage::Configure),
        configure_fatal: true,
        ..RecordingTask::producing("claims.xlsx")
    };

    let result = run_pipeline(&ctx, &mut task).await;

    assert!(!result.success);
    assert_eq!(task.count(Stage::Execute), 0);
    assert_eq!(task.count(Stage::Collect), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_artifacts_are_a_failure_unless_allowed() {
    let root = TempDir::new().unwrap();
    let driver = FakeDriver::new();
    let ctx = task_context(driver.clone(), root.path());

    let mut strict = RecordingTask::default();
    let result = run_pipeline(&ctx, &mut strict).await;
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("no artifacts collected"));
    assert_eq!(driver.screenshots(), 1);

    let mut lenient = RecordingTask {
        allow_empty: true,
        ..Default::default()
    };
    let result = run_pipeline(&ctx, &mut lenient).await;
    assert!(result.success);
    assert!(result.diagnostic.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stage_timeout_aborts_the_run() {
    let root = TempDir::new().unwrap();
    let ctx = task_context(FakeDriver::new(), root.path());
    let mut task = RecordingTask {
        hang_at: Some(Stage::Execute),
        ..RecordingTask::producing("claims.xlsx")
    };

    let started = tokio::time::Instant::now();
    let result = run_pipeline(&ctx, &mut task).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    assert_eq!(task.count(Stage::Collect), 0);
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_retries_absorb_transient_failures() {
    let root = TempDir::new().unwrap();
    let ctx = task_context(FakeDriver::new(), root.path());
    let mut task = RecordingTask {
        flaky_execute: 2,
        execute_retries: 2,
        ..RecordingTask::producing("claims.xlsx")
    };

    let result = run_pipeline(&ctx, &mut task).await;

    assert!(result.success);
    assert_eq!(task.count(Stage::Execute), 3);

    let mut exhausted = RecordingTask {
        flaky_execute: 3,
        execute_retries: 2,
        ..RecordingTask::producing("claims.xlsx")
    };
    let result = run_pipeline(&ctx, &mut exhausted).await;
    assert!(!result.success);
    assert_eq!(exhausted.count(Stage::Execute), 3);
}

/// Claim download page with every control present.
fn claim_portal(download_dir: PathBuf) -> Arc<FakeDriver> {
    let layout = PortalLayout::default();
    let driver = FakeDriver::new();
    driver.show_first(&layout.claim_inquiry_menu);
    driver.show("id:startDate");
    driver.show("id:endDate");
    driver.show_first(&layout.search_button);
    let button = layout.claim_download_button(FileFormat::Excel);
    driver.show_first(&button);
    driver.on_click_first(
        &button,
        ClickEffect::WriteFile(download_dir.join("claims.xlsx"), b"xlsx".to_vec()),
    );
    driver
}

#[tokio::test(start_paused = true)]
async fn test_download_month_fills_dates_and_collects_file() {
    let root = TempDir::new().unwrap();
    let download_dir = root.path().join("downloads");
    let driver = claim_portal(download_dir.clone());
    let runner = TaskRunner::new(task_context(driver.clone(), root.path()));

    let result = runner
        .download_month(2026, 1, FileFormat::Excel)
        .await
        .unwrap();

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.kind, TaskKind::Download);
    assert_eq!(result.artifacts, vec![download_dir.join("claims.xlsx")]);
    let typed = driver.typed();
    assert!(typed.contains(&("id:startDate".to_string(), "20260101".to_string())));
    assert!(typed.contains(&("id:endDate".to_string(), "20260131".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_download_month_rejects_invalid_month() {
    let root = TempDir::new().unwrap();
    let runner = TaskRunner::new(task_context(FakeDriver::new(), root.path()));

    let err = runner
        .download_month(2026, 13, FileFormat::Excel)
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::InvalidArgument(_)));
}

#[tokio::test(start_paused = true)]
async fn test_download_without_a_file_fails() {
    let root = TempDir::new().unwrap();
    let layout = PortalLayout::default();
    let driver = FakeDriver::new();
    driver.show_first(&layout.claim_inquiry_menu);
    driver.show_first(&layout.search_button);
    driver.show_first(&layout.claim_download_button(FileFormat::Excel));
    let runner = TaskRunner::new(task_context(driver.clone(), root.path()));

    let result = runner.download_month(2026, 2, FileFormat::Excel).await.unwrap();

    assert!(!result.success);
    assert!(result.artifacts.is_empty());
    assert!(result.error.unwrap().contains("Collect"));
}

/// Upload page: menu, file input, submit, plus whatever the test adds.
fn upload_portal() -> Arc<FakeDriver> {
    let layout = PortalLayout::default();
    let driver = FakeDriver::new();
    driver.show_first(&layout.claim_upload_menu);
    driver.show_first(&layout.file_input);
    driver.show("id:submitBtn");
    driver
}

fn claim_file(root: &TempDir, name: &str) -> PathBuf {
    let path = root.path().join(name);
    std::fs::write(&path, b"claim data").unwrap();
    path
}

#[tokio::test(start_paused = true)]
async fn test_upload_validation_failure_never_submits() {
    let root = TempDir::new().unwrap();
    let file = claim_file(&root, "claims_202601.xlsx");
    let driver = upload_portal();
    driver.show("id:validateBtn");
    driver.on_click(
        "id:validateBtn",
        ClickEffect::RevealText(
            "class:validation-error".to_string(),
            "필수 항목 누락".to_string(),
        ),
    );
    let ctx = task_context(driver.clone(), root.path());

    let mut task = UploadTask::new(&file, true);
    let result = run_pipeline(&ctx, &mut task).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("필수 항목 누락"));
    assert_eq!(
        task.verdict(),
        Some(&ValidationVerdict::Failed("필수 항목 누락".to_string()))
    );
    assert!(!driver.clicked("id:submitBtn"));
    assert_eq!(driver.screenshots(), 1);
    assert!(driver
        .typed()
        .iter()
        .any(|(_, text)| text.ends_with("claims_202601.xlsx")));
}

#[tokio::test(start_paused = true)]
async fn test_upload_with_unknown_verdict_submits_and_accepts_confirmation() {
    let root = TempDir::new().unwrap();
    let file = claim_file(&root, "claims_202601.xlsx");
    let driver = upload_portal();
    driver.show("id:validateBtn");
    driver.on_click("id:submitBtn", ClickEffect::Alert("접수가 완료되었습니다".to_string()));
    let ctx = task_context(driver.clone(), root.path());

    let mut task = UploadTask::new(&file, true);
    let result = run_pipeline(&ctx, &mut task).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.artifacts, vec![file]);
    assert_eq!(task.verdict(), Some(&ValidationVerdict::Unknown));
    assert_eq!(task.confirmation(), Some("접수가 완료되었습니다"));
    assert_eq!(driver.accepted_alerts(), vec!["접수가 완료되었습니다"]);
}

#[tokio::test(start_paused = true)]
async fn test_upload_of_missing_file_fails_at_configure() {
    let root = TempDir::new().unwrap();
    let driver = upload_portal();
    let ctx = task_context(driver.clone(), root.path());

    let mut task = UploadTask::new(root.path().join("absent.xlsx"), false);
    let result = run_pipeline(&ctx, &mut task).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Configure"));
    assert!(!driver.clicked("id:submitBtn"));
}

#[tokio::test(start_paused = true)]
async fn test_upload_many_keeps_going_after_a_failure() {
    let root = TempDir::new().unwrap();
    let present = claim_file(&root, "a.xlsx");
    let missing = root.path().join("b.xlsx");
    let runner = TaskRunner::new(task_context(upload_portal(), root.path()));

    let results = runner
        .upload_many(&[present.clone(), missing.clone()], false)
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[&present].success);
    assert!(!results[&missing].success);
}

#[tokio::test(start_paused = true)]
async fn test_monthly_reports_runs_every_kind() {
    let root = TempDir::new().unwrap();
    let download_dir = root.path().join("downloads");
    let layout = PortalLayout::default();
    let driver = FakeDriver::new();
    driver.show_first(&layout.statistics_menu);
    driver.show_first(&layout.report_kind_option("월별 청구현황"));
    driver.show("id:reportStartDate");
    driver.show("id:reportEndDate");
    driver.show_first(&layout.generate_button);
    let button = layout.report_download_button(FileFormat::Excel);
    driver.show_first(&button);
    driver.on_click_first(&button, ClickEffect::WriteNumbered(download_dir.join("report.xlsx")));
    let runner = TaskRunner::new(task_context(driver.clone(), root.path()));

    let kinds = vec!["월별 청구현황".to_string(), "심사결과".to_string()];
    let results = runner
        .monthly_reports(2026, 3, &kinds, FileFormat::Excel)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let first = &results["월별 청구현황"];
    let second = &results["심사결과"];
    assert!(first.success && second.success);
    assert_eq!(first.kind, TaskKind::Report);
    assert_ne!(first.artifacts, second.artifacts);
    assert!(driver
        .typed()
        .contains(&("id:reportEndDate".to_string(), "20260331".to_string())));
}
