use super::fake_driver::{ClickEffect, FakeDriver};
use super::{init_tracing, task_context};
use crate::backup::{BackupKind, BackupManager, BackupStore, PhaseOutcome, MANIFEST_FILE};
use crate::clock::ManualClock;
use crate::dates::DateRange;
use crate::pipeline::{FileFormat, TaskRunner};
use crate::portal::PortalLayout;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn manager(driver: Arc<FakeDriver>, root: &TempDir) -> BackupManager {
    let clock = Arc::new(ManualClock::at(
        NaiveDate::from_ymd_opt(2026, 1, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap(),
    ));
    let store = BackupStore::new(root.path().join("backups"), clock);
    let runner = TaskRunner::new(task_context(driver, root.path()));
    BackupManager::new(store, runner, 10)
}

fn january() -> DateRange {
    DateRange::month(2026, 1).unwrap()
}

fn manifests_under(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                manifests_under(&path)
            } else {
                usize::from(path.file_name().is_some_and(|n| n == MANIFEST_FILE))
            }
        })
        .sum()
}

#[tokio::test(start_paused = true)]
async fn test_full_backup_writes_one_manifest_even_when_everything_fails() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let manager = manager(FakeDriver::new(), &root);

    let summary = manager
        .full_backup(january(), &["월별 청구현황".to_string()])
        .await
        .unwrap();

    assert!(!summary.success);
    assert_eq!(summary.manifest.claims, PhaseOutcome::Failed);
    assert_eq!(summary.manifest.reports, PhaseOutcome::Failed);
    assert_eq!(
        summary.folder.file_name().unwrap().to_string_lossy(),
        "full_backup_20260115_100000"
    );
    assert_eq!(manifests_under(&root.path().join("backups")), 1);

    let listed = manager.list_backups().unwrap();
    assert_eq!(listed.len(), 1);
    let manifest = listed[0].manifest.as_ref().expect("manifest parses back");
    assert_eq!(manifest.report_kinds, vec!["월별 청구현황"]);
    assert_eq!(manifest.range, january());
}

#[tokio::test(start_paused = true)]
async fn test_full_backup_copies_claims_and_skips_reports_without_kinds() {
    let root = TempDir::new().unwrap();
    let download_dir = root.path().join("downloads");
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
    let manager = manager(driver, &root);

    let summary = manager.full_backup(january(), &[]).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.manifest.claims, PhaseOutcome::Succeeded);
    assert_eq!(summary.manifest.reports, PhaseOutcome::Skipped);
    assert!(summary.folder.join("claims.xlsx").is_file());
    let written = std::fs::read_to_string(summary.manifest_path.unwrap()).unwrap();
    assert!(written.contains("claims: success"));
    assert!(written.contains("reports: skipped"));
}

#[tokio::test(start_paused = true)]
async fn test_report_backup_without_kinds_does_nothing() {
    let root = TempDir::new().unwrap();
    let manager = manager(FakeDriver::new(), &root);

    assert!(!manager.run_kind(BackupKind::Report, january(), &[]).await);
    assert!(manager.list_backups().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_standalone_claim_backup_gets_its_own_folder() {
    let root = TempDir::new().unwrap();
    let manager = manager(FakeDriver::new(), &root);

    assert!(!manager.backup_claims(january(), None).await);

    let listed = manager.list_backups().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "claim_backup_20260115_100000");
    // Only full backups carry a manifest
    assert!(listed[0].manifest.is_none());
    assert!(listed[0].details.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_full_backup_succeeds_when_only_reports_succeed() {
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
    driver.on_click_first(
        &button,
        ClickEffect::WriteFile(download_dir.join("report.xlsx"), b"xlsx".to_vec()),
    );
    let manager = manager(driver, &root);

    let summary = manager
        .full_backup(january(), &["월별 청구현황".to_string()])
        .await
        .unwrap();

    assert!(summary.success);
    assert_eq!(summary.manifest.claims, PhaseOutcome::Failed);
    assert_eq!(summary.manifest.reports, PhaseOutcome::Succeeded);
    assert!(summary.folder.join("report.xlsx").is_file());
    let written = std::fs::read_to_string(summary.manifest_path.unwrap()).unwrap();
    assert!(written.contains("claims: failure"));
    assert!(written.contains("reports: success"));
    assert_eq!(manifests_under(&root.path().join("backups")), 1);
}
