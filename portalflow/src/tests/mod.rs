mod backup_tests;
mod jobs_tests;
pub mod fake_driver;
mod pipeline_tests;

use crate::diagnostics::Diagnostics;
use crate::locator::LocatorResolver;
use crate::pipeline::{SettleTimes, StageTimeouts, TaskContext};
use crate::portal::PortalLayout;
use fake_driver::FakeDriver;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Task context over a fake driver with downloads and screenshots under `root`.
pub fn task_context(driver: Arc<FakeDriver>, root: &Path) -> TaskContext {
    TaskContext {
        resolver: LocatorResolver::new(driver.clone()),
        driver,
        layout: Arc::new(PortalLayout::default()),
        download_dir: root.join("downloads"),
        diagnostics: Diagnostics::new(root.join("logs")),
        settle: SettleTimes::default(),
        timeouts: StageTimeouts::default(),
    }
}

/// Number of png files written to a diagnostics directory
pub fn screenshots_in(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
                .count()
        })
        .unwrap_or(0)
}
