//! Workflow automation for an authenticated claims portal
//!
//! Signs in through a browser driver, downloads and uploads claim files,
//! generates statistics reports, files the results into dated backup folders
//! and runs all of it on a recurring schedule.

pub mod backup;
pub mod clock;
pub mod config;
pub mod dates;
pub mod diagnostics;
pub mod downloads;
pub mod driver;
pub mod errors;
pub mod jobs;
pub mod locator;
pub mod pipeline;
pub mod portal;
pub mod scheduler;
pub mod selector;
pub mod session;
#[cfg(test)]
mod tests;
pub mod webdriver;

pub use backup::{
    BackupKind, BackupManager, BackupManifest, BackupRecord, BackupStore, FullBackupSummary,
    PhaseOutcome, RetentionReport,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BrowserSettings, Config};
pub use dates::DateRange;
pub use diagnostics::Diagnostics;
pub use driver::{BrowserDriver, DriverFactory, ElementRef};
pub use errors::AutomationError;
pub use jobs::BackupJob;
pub use locator::{Locator, LocatorResolver, Requirement, Resolution};
pub use pipeline::{
    FileFormat, PipelineTask, SettleTimes, Stage, StageTimeouts, TaskContext, TaskKind,
    TaskResult, TaskRunner, TaskStep,
};
pub use portal::PortalLayout;
pub use scheduler::{JobBinding, JobRunner, ScheduledJob, Scheduler, StopHandle, Trigger};
pub use selector::Selector;
pub use session::{LoginOutcome, LoginSettings, Session, SessionState};
pub use webdriver::{WebDriverClient, WebDriverLauncher};
