//! Backups of claim data and reports into timestamped folders, plus retention.

mod manifest;
mod store;

pub use manifest::{BackupManifest, PhaseOutcome, MANIFEST_FILE};
pub use store::{BackupRecord, BackupStore, FolderLease, RetentionReport};

use crate::dates::DateRange;
use crate::pipeline::{FileFormat, TaskResult, TaskRunner};
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

/// What a backup kind copies. Also the scheduler's job binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    Full,
    #[serde(alias = "claims")]
    Claim,
    #[serde(alias = "reports")]
    Report,
}

impl std::fmt::Display for BackupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BackupKind::Full => "full",
            BackupKind::Claim => "claim",
            BackupKind::Report => "report",
        })
    }
}

impl std::str::FromStr for BackupKind {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(BackupKind::Full),
            "claim" | "claims" => Ok(BackupKind::Claim),
            "report" | "reports" => Ok(BackupKind::Report),
            other => Err(AutomationError::InvalidArgument(format!(
                "unknown backup type '{other}' (expected full, claim or report)"
            ))),
        }
    }
}

/// Result of one `full_backup` call.
#[derive(Debug, Clone, Serialize)]
pub struct FullBackupSummary {
    pub folder: PathBuf,
    pub manifest: BackupManifest,
    /// `None` when the manifest could not be written
    pub manifest_path: Option<PathBuf>,
    /// Either phase succeeded
    pub success: bool,
}

/// Runs download and report tasks and files their output under the backup root.
pub struct BackupManager {
    store: BackupStore,
    runner: TaskRunner,
    /// How many collected files to copy per task
    recent_files: usize,
    format: FileFormat,
}

impl BackupManager {
    pub fn new(store: BackupStore, runner: TaskRunner, recent_files: usize) -> Self {
        Self {
            store,
            runner,
            recent_files,
            format: FileFormat::Excel,
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Download claims for `range` and copy them into `folder`, or a new `claim_backup_*` folder.
    #[instrument(skip(self, folder), fields(range = %range))]
    pub async fn backup_claims(&self, range: DateRange, folder: Option<&Path>) -> bool {
        let lease;
        let folder = match folder {
            Some(folder) => folder,
            None => match self.store.create_folder("claim_backup") {
                Ok(created) => {
                    lease = created;
                    lease.path()
                }
                Err(e) => {
                    error!("Cannot create claim backup folder: {}", e);
                    return false;
                }
            },
        };

        info!("Backing up claim data");
        let result = self.runner.download(range, self.format).await;
        if !result.success {
            error!(
                "Claim download failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
            return false;
        }

        self.copy_artifacts(&result, folder);
        info!("Claim backup finished: {}", folder.display());
        true
    }

    /// Generate each report kind for `range` and copy the files into `folder`,
    /// or a new `report_backup_*` folder. Succeeds when at least one kind did.
    #[instrument(skip(self, kinds, folder), fields(range = %range, kinds = kinds.len()))]
    pub async fn backup_reports(&self, kinds: &[String], range: DateRange, folder: Option<&Path>) -> bool {
        if kinds.is_empty() {
            warn!("No report kinds requested");
            return false;
        }

        let lease;
        let folder = match folder {
            Some(folder) => folder,
            None => match self.store.create_folder("report_backup") {
                Ok(created) => {
                    lease = created;
                    lease.path()
                }
                Err(e) => {
                    error!("Cannot create report backup folder: {}", e);
                    return false;
                }
            },
        };

        let mut succeeded = 0;
        for kind in kinds {
            let result = self.runner.report(kind, range, self.format).await;
            if result.success {
                succeeded += 1;
                self.copy_artifacts(&result, folder);
            } else {
                error!(
                    "Report '{}' failed: {}",
                    kind,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        info!("Report backup finished: {}/{} succeeded", succeeded, kinds.len());
        succeeded > 0
    }

    /// Claims and reports into one `full_backup_*` folder, always leaving a manifest.
    ///
    /// Only failing to create the folder is an error. Phase failures are
    /// recorded in the manifest; the summary succeeds if either phase did.
    #[instrument(skip(self, kinds), fields(range = %range))]
    pub async fn full_backup(
        &self,
        range: DateRange,
        kinds: &[String],
    ) -> Result<FullBackupSummary, AutomationError> {
        info!("============================================================");
        info!("Starting full backup");
        info!("============================================================");

        let lease = self.store.create_folder("full_backup")?;
        let folder = lease.path();

        let claims = PhaseOutcome::from_success(self.backup_claims(range, Some(folder)).await);
        let reports = if kinds.is_empty() {
            PhaseOutcome::Skipped
        } else {
            PhaseOutcome::from_success(self.backup_reports(kinds, range, Some(folder)).await)
        };

        let manifest = BackupManifest {
            timestamp: self.store.clock().now().naive_local(),
            range,
            claims,
            reports,
            report_kinds: kinds.to_vec(),
        };
        let manifest_path = match self.store.write_manifest(folder, &manifest) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Failed to write backup manifest: {}", e);
                None
            }
        };

        let success = claims.is_success() || reports.is_success();
        if success && (claims == PhaseOutcome::Failed || reports == PhaseOutcome::Failed) {
            warn!(
                "{}",
                AutomationError::PartialBackupFailure(format!("claims {claims}, reports {reports}"))
            );
        }

        info!("============================================================");
        info!("Full backup finished: {}", folder.display());
        info!("============================================================");

        Ok(FullBackupSummary {
            folder: folder.to_path_buf(),
            manifest,
            manifest_path,
            success,
        })
    }

    /// Run one backup kind. Used by scheduled jobs.
    pub async fn run_kind(&self, kind: BackupKind, range: DateRange, report_kinds: &[String]) -> bool {
        match kind {
            BackupKind::Full => match self.full_backup(range, report_kinds).await {
                Ok(summary) => summary.success,
                Err(e) => {
                    error!("Full backup could not start: {}", e);
                    false
                }
            },
            BackupKind::Claim => self.backup_claims(range, None).await,
            BackupKind::Report => {
                if report_kinds.is_empty() {
                    warn!("Report backup requested without report kinds, nothing to do");
                    return false;
                }
                self.backup_reports(report_kinds, range, None).await
            }
        }
    }

    pub fn cleanup_old_backups(&self, keep_days: u32) -> Result<usize, AutomationError> {
        self.store.cleanup_old_backups(keep_days)
    }

    pub fn list_backups(&self) -> Result<Vec<BackupRecord>, AutomationError> {
        self.store.list_backups()
    }

    /// Copy up to `recent_files` artifacts, newest first. Per-file failures are logged.
    fn copy_artifacts(&self, result: &TaskResult, folder: &Path) {
        for artifact in result.artifacts.iter().take(self.recent_files) {
            let Some(name) = artifact.file_name() else {
                continue;
            };
            let dest = folder.join(name);
            match std::fs::copy(artifact, &dest) {
                Ok(_) => info!("Backed up {}", dest.display()),
                Err(e) => error!("Failed to back up {}: {}", artifact.display(), e),
            }
        }
    }
}
