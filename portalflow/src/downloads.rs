//! Detecting files the browser drops into the download directory.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Extensions browsers use while a download is still being written
const PARTIAL_EXTENSIONS: &[&str] = &["crdownload", "part", "tmp", "download"];

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PARTIAL_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn scan(dir: &Path) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            files.push((entry.path(), metadata.modified()?));
        }
    }
    Ok(files)
}

/// Remembers what the download directory looked like before a retrieval click.
#[derive(Debug)]
pub struct DownloadWatcher {
    dir: PathBuf,
    before: HashMap<PathBuf, SystemTime>,
}

impl DownloadWatcher {
    pub fn snapshot(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let before = scan(&dir)?.into_iter().collect();
        Ok(Self { dir, before })
    }

    /// Files that are new or rewritten since the snapshot, split into (complete, partial).
    fn changes(&self) -> io::Result<(Vec<(PathBuf, SystemTime)>, usize)> {
        let mut complete = Vec::new();
        let mut partial = 0;
        for (path, modified) in scan(&self.dir)? {
            if self.before.get(&path) == Some(&modified) {
                continue;
            }
            if is_partial(&path) {
                partial += 1;
            } else {
                complete.push((path, modified));
            }
        }
        Ok((complete, partial))
    }

    /// Wait until at least one new file has fully landed, or `timeout` elapses.
    ///
    /// Returns the new complete files, newest first. Empty when nothing landed.
    pub async fn wait_for_new(&self, timeout: Duration, poll: Duration) -> io::Result<Vec<PathBuf>> {
        let deadline = Instant::now() + timeout;
        loop {
            let (mut complete, partial) = self.changes()?;
            let now = Instant::now();
            if (!complete.is_empty() && partial == 0) || now >= deadline {
                complete.sort_by(|a, b| b.1.cmp(&a.1));
                debug!(
                    landed = complete.len(),
                    in_progress = partial,
                    "Download directory check finished"
                );
                return Ok(complete.into_iter().map(|(path, _)| path).collect());
            }
            sleep(poll.min(deadline - now)).await;
        }
    }
}
