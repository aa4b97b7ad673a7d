//! Filesystem side of backups: timestamped folders, manifests, retention and listing.

use super::manifest::{BackupManifest, MANIFEST_FILE};
use crate::clock::Clock;
use crate::AutomationError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};

const FOLDER_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn folder_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"_(\d{8}_\d{6})(?:_(\d+))?$").ok())
        .as_ref()
}

/// Creation time and disambiguator encoded in a folder name, if any.
fn parse_folder_name(name: &str) -> Option<(NaiveDateTime, u32)> {
    let captures = folder_name_pattern()?.captures(name)?;
    let stamp = NaiveDateTime::parse_from_str(captures.get(1)?.as_str(), FOLDER_TIMESTAMP).ok()?;
    let sequence = captures
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1);
    Some((stamp, sequence))
}

fn local_time(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

type ActiveSet = Arc<Mutex<HashSet<PathBuf>>>;

/// A backup folder being written. Retention leaves it alone until the lease drops.
#[derive(Debug)]
pub struct FolderLease {
    path: PathBuf,
    active: ActiveSet,
}

impl FolderLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FolderLease {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.path);
        }
    }
}

/// One backup folder as found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub name: String,
    pub folder: PathBuf,
    pub created: DateTime<Local>,
    /// Parsed `backup_info.txt`, when present and well formed
    pub manifest: Option<BackupManifest>,
    /// Raw manifest text, kept even when it does not parse
    pub details: Option<String>,
    #[serde(skip)]
    sequence: u32,
}

/// Outcome of one retention sweep.
#[derive(Debug, Default)]
pub struct RetentionReport {
    pub deleted: Vec<PathBuf>,
    /// Folders kept because they are still being written
    pub skipped_active: Vec<PathBuf>,
    pub failures: Vec<AutomationError>,
}

/// Owns the backup root. Folder creation is the only writer during a run.
#[derive(Clone)]
pub struct BackupStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    active: ActiveSet,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Allocate `<prefix>_<YYYYmmdd_HHMMSS>`, adding `_2`, `_3`, ... when that name is taken.
    pub fn create_folder(&self, prefix: &str) -> Result<FolderLease, AutomationError> {
        std::fs::create_dir_all(&self.root)?;
        let base = format!("{prefix}_{}", self.clock.now().format(FOLDER_TIMESTAMP));

        let mut sequence = 1u32;
        loop {
            let name = if sequence == 1 {
                base.clone()
            } else {
                format!("{base}_{sequence}")
            };
            let path = self.root.join(&name);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    self.lock_active()?.insert(path.clone());
                    info!("Created backup folder {}", path.display());
                    return Ok(FolderLease {
                        path,
                        active: self.active.clone(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => sequence += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Write the manifest into a folder. Returns the manifest path.
    pub fn write_manifest(&self, folder: &Path, manifest: &BackupManifest) -> Result<PathBuf, AutomationError> {
        let path = folder.join(MANIFEST_FILE);
        std::fs::write(&path, manifest.render())?;
        info!("Wrote backup manifest {}", path.display());
        Ok(path)
    }

    /// Delete top-level folders older than `keep_days`. Returns the number deleted.
    pub fn cleanup_old_backups(&self, keep_days: u32) -> Result<usize, AutomationError> {
        Ok(self.sweep(keep_days)?.deleted.len())
    }

    /// Retention pass with per-folder detail.
    ///
    /// A folder goes when `now - mtime` is strictly greater than `keep_days`.
    /// Folders that fail to delete are reported and the scan continues.
    pub fn sweep(&self, keep_days: u32) -> Result<RetentionReport, AutomationError> {
        self.sweep_with(keep_days, |path| std::fs::remove_dir_all(path))
    }

    fn sweep_with<F>(&self, keep_days: u32, remove: F) -> Result<RetentionReport, AutomationError>
    where
        F: Fn(&Path) -> io::Result<()>,
    {
        info!("Removing backups older than {} days", keep_days);
        let mut report = RetentionReport::default();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::from(self.clock.now());
        let threshold = Duration::from_secs(u64::from(keep_days) * SECS_PER_DAY);

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry under {}: {}", self.root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_dir() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .unwrap_or_default();
            if age <= threshold {
                continue;
            }
            if self.is_active(&path) {
                warn!("Skipping {}: backup still in progress", path.display());
                report.skipped_active.push(path);
                continue;
            }

            match remove(&path) {
                Ok(()) => {
                    info!(
                        "Deleted backup folder {} ({} days old)",
                        path.display(),
                        age.as_secs() / SECS_PER_DAY
                    );
                    report.deleted.push(path);
                }
                Err(e) => {
                    let failure = AutomationError::RetentionCleanupFailure {
                        folder: path.display().to_string(),
                        reason: e.to_string(),
                    };
                    error!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }

        info!("Backup cleanup finished: {} folder(s) deleted", report.deleted.len());
        Ok(report)
    }

    /// Every backup folder, newest first, with its manifest when present.
    ///
    /// Creation time comes from the timestamp in the folder name, falling back
    /// to the folder's modification time for names without one.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>, AutomationError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let Ok(entry) = entry.inspect_err(|e| warn!("Cannot read backup entry: {}", e)) else {
                continue;
            };
            let folder = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_dir() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Cannot stat {}: {}", folder.display(), e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();

            let (created, sequence) = match parse_folder_name(&name) {
                Some((stamp, sequence)) => (local_time(stamp), sequence),
                None => match metadata.modified() {
                    Ok(mtime) => (DateTime::<Local>::from(mtime), 1),
                    Err(e) => {
                        warn!("No modification time for {}: {}", folder.display(), e);
                        continue;
                    }
                },
            };

            let details = std::fs::read_to_string(folder.join(MANIFEST_FILE)).ok();
            let manifest = details.as_deref().and_then(|text| match BackupManifest::parse(text) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!("Unreadable manifest in {}: {}", name, e);
                    None
                }
            });

            records.push(BackupRecord {
                name,
                folder,
                created,
                manifest,
                details,
                sequence,
            });
        }

        records.sort_by(|a, b| {
            (b.created, b.sequence, &b.name).cmp(&(a.created, a.sequence, &a.name))
        });
        Ok(records)
    }

    /// Whether a live lease covers `path`. A poisoned registry is still read.
    fn is_active(&self, path: &Path) -> bool {
        match self.active.lock() {
            Ok(active) => active.contains(path),
            Err(poisoned) => poisoned.into_inner().contains(path),
        }
    }

    fn lock_active(&self) -> Result<std::sync::MutexGuard<'_, HashSet<PathBuf>>, AutomationError> {
        self.active
            .lock()
            .map_err(|_| AutomationError::Internal("active folder registry poisoned".to_string()))
    }
}
