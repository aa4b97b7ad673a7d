use super::fake_driver::{ClickEffect, FakeDriver, FakeFactory};
use super::init_tracing;
use crate::backup::BackupKind;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::jobs::BackupJob;
use crate::pipeline::FileFormat;
use crate::portal::PortalLayout;
use crate::scheduler::{JobBinding, JobRunner, ScheduledJob, Trigger};
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tempfile::TempDir;

fn config_in(root: &TempDir) -> Config {
    let mut config = Config::default();
    config.download.directory = root.path().join("downloads");
    config.backup.root = root.path().join("backups");
    config.diagnostics.directory = root.path().join("logs");
    config
}

fn job(kind: BackupKind) -> ScheduledJob {
    ScheduledJob {
        id: 1,
        trigger: Trigger::Daily,
        at: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        binding: JobBinding::new(kind, Vec::new()),
        next_run: NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(2, 0, 0)
            .unwrap(),
    }
}

fn backup_job(driver: &Arc<FakeDriver>, config: Config) -> BackupJob {
    BackupJob::new(
        Arc::new(FakeFactory {
            driver: driver.clone(),
        }),
        config,
        Some("s3cret".to_string()),
        Arc::new(SystemClock),
    )
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_skips_backup_and_closes_browser() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let driver = FakeDriver::new();

    backup_job(&driver, config_in(&root))
        .run_job(&job(BackupKind::Full))
        .await;

    assert!(driver.was_quit());
    assert_eq!(driver.screenshots(), 1);
    assert!(!root.path().join("backups").exists());
}

#[tokio::test(start_paused = true)]
async fn test_claim_job_backs_up_and_logs_out() {
    let root = TempDir::new().unwrap();
    let config = config_in(&root);
    let layout = PortalLayout::default();
    let driver = FakeDriver::new();

    driver.show_first(&layout.credential_login);
    driver.show("id:certPassword");
    driver.show("id:confirmBtn");
    driver.on_click("id:confirmBtn", ClickEffect::Reveal("id:logoutBtn".to_string()));

    driver.show_first(&layout.claim_inquiry_menu);
    driver.show("id:startDate");
    driver.show("id:endDate");
    driver.show_first(&layout.search_button);
    let button = layout.claim_download_button(FileFormat::Excel);
    driver.show_first(&button);
    driver.on_click_first(
        &button,
        ClickEffect::WriteFile(config.download.directory.join("claims.xlsx"), b"xlsx".to_vec()),
    );

    backup_job(&driver, config.clone())
        .run_job(&job(BackupKind::Claim))
        .await;

    let folders: Vec<_> = std::fs::read_dir(&config.backup.root)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();
    assert_eq!(folders.len(), 1);
    assert!(folders[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("claim_backup_"));
    assert!(folders[0].join("claims.xlsx").is_file());
    assert!(driver.clicked("id:logoutBtn"));
    assert!(driver.was_quit());
}
