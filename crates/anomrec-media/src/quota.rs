//! Storage quota enforcement for the recordings directory.
//!
//! Recordings are deleted oldest-modification-time first until the directory
//! total is at or under the limit. Files still being written are never
//! touched, and a failed deletion is logged and skipped.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anomrec_models::{format_bytes, format_percentage, Settings, RECORDING_EXTENSION};
use tracing::{debug, info, warn};

use crate::error::MediaResult;
use crate::metrics;

/// A recording found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Outcome of one enforcement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaReport {
    /// Deleted files, in deletion order.
    pub deleted: Vec<PathBuf>,
    pub bytes_freed: u64,
    pub used_before: u64,
    pub used_after: u64,
    /// Files whose deletion failed.
    pub failures: usize,
}

impl QuotaReport {
    pub fn evicted(&self) -> usize {
        self.deleted.len()
    }
}

/// Deletes the oldest recordings while the directory is over its limit.
#[derive(Debug, Clone)]
pub struct StorageQuotaEnforcer {
    dir: PathBuf,
    limit_bytes: u64,
    margin_bytes: u64,
}

impl StorageQuotaEnforcer {
    pub fn new(dir: impl Into<PathBuf>, limit_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            limit_bytes,
            margin_bytes: 0,
        }
    }

    pub fn from_settings(dir: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self::new(dir, settings.storage_limit_bytes())
    }

    /// Evict down to `limit - margin` instead of exactly the limit.
    pub fn with_margin(mut self, margin_bytes: u64) -> Self {
        self.margin_bytes = margin_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn set_limit_bytes(&mut self, limit_bytes: u64) {
        self.limit_bytes = limit_bytes;
    }

    fn target_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.margin_bytes)
    }

    /// Recordings in the directory, oldest first.
    pub fn list_recordings(&self) -> MediaResult<Vec<RecordingFile>> {
        list_recordings(&self.dir)
    }

    /// Enforce the limit, skipping `protected` paths (open writers).
    pub fn enforce(&self, protected: &[PathBuf]) -> MediaResult<QuotaReport> {
        self.enforce_with(protected, |path| std::fs::remove_file(path))
    }

    /// [`enforce`](Self::enforce) with a custom delete operation.
    pub fn enforce_with<F>(&self, protected: &[PathBuf], mut remove: F) -> MediaResult<QuotaReport>
    where
        F: FnMut(&Path) -> io::Result<()>,
    {
        let files = self.list_recordings()?;
        let used_before: u64 = files.iter().map(|f| f.size).sum();
        let target = self.target_bytes();

        let mut report = QuotaReport {
            used_before,
            used_after: used_before,
            ..QuotaReport::default()
        };

        if used_before <= target {
            debug!(
                dir = %self.dir.display(),
                used = used_before,
                limit = self.limit_bytes,
                "Storage within limit"
            );
            metrics::record_storage_used(used_before);
            return Ok(report);
        }

        for file in &files {
            if report.used_after <= target {
                break;
            }
            if protected.iter().any(|p| p == &file.path) {
                continue;
            }
            match remove(&file.path) {
                Ok(()) => {
                    report.used_after -= file.size;
                    report.bytes_freed += file.size;
                    report.deleted.push(file.path.clone());
                    metrics::record_quota_eviction(file.size);
                    info!(path = %file.path.display(), size = file.size, "Evicted recording");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(path = %file.path.display(), error = %e, "Failed to delete recording");
                }
            }
        }

        if report.used_after > target {
            warn!(
                dir = %self.dir.display(),
                used = report.used_after,
                limit = self.limit_bytes,
                "Storage still over limit after eviction"
            );
        }
        metrics::record_storage_used(report.used_after);
        Ok(report)
    }

    /// Current usage against the limit.
    pub fn usage(&self) -> MediaResult<StorageUsage> {
        Ok(StorageUsage::new(directory_usage(&self.dir)?, self.limit_bytes))
    }
}

/// Recording files in `dir`, sorted by ascending modification time.
///
/// A missing directory has no recordings. Files that cannot be inspected
/// are logged and left out.
pub fn list_recordings(dir: &Path) -> MediaResult<Vec<RecordingFile>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !has_recording_extension(&path) {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.is_file() => {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push(RecordingFile {
                    path,
                    size: meta.len(),
                    modified,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to stat recording"),
        }
    }

    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(files)
}

fn has_recording_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(RECORDING_EXTENSION))
}

/// Total size of the regular files directly inside `dir`.
pub fn directory_usage(dir: &Path) -> MediaResult<u64> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        match entry.metadata() {
            Ok(meta) if meta.is_file() => total += meta.len(),
            Ok(_) => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to stat file"),
        }
    }
    Ok(total)
}

/// Delete every recording in `dir` except `protected`. Returns the number
/// of files removed.
pub fn clear_recordings(dir: &Path, protected: &[PathBuf]) -> MediaResult<usize> {
    let mut removed = 0;
    for file in list_recordings(dir)? {
        if protected.iter().any(|p| p == &file.path) {
            continue;
        }
        match std::fs::remove_file(&file.path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %file.path.display(), error = %e, "Failed to delete recording"),
        }
    }
    info!(dir = %dir.display(), removed, "Cleared recordings");
    Ok(removed)
}

/// Bytes used against a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl StorageUsage {
    pub fn new(used_bytes: u64, limit_bytes: u64) -> Self {
        Self {
            used_bytes,
            limit_bytes,
        }
    }

    pub fn is_over_limit(&self) -> bool {
        self.used_bytes > self.limit_bytes
    }
}

impl fmt::Display for StorageUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} · {} / {}",
            format_percentage(self.used_bytes as f64, self.limit_bytes as f64),
            format_bytes(self.used_bytes),
            format_bytes(self.limit_bytes)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn write_file(dir: &Path, name: &str, size: usize, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; size]).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
        path
    }

    #[test]
    fn test_evicts_oldest_first_until_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = write_file(dir.path(), "recording_cam0_20240101_000000.avi", 100, 300);
        let middle = write_file(dir.path(), "recording_cam0_20240101_000100.avi", 100, 200);
        let newest = write_file(dir.path(), "recording_cam0_20240101_000200.avi", 100, 100);

        let report = StorageQuotaEnforcer::new(dir.path(), 150).enforce(&[]).unwrap();
        assert_eq!(report.deleted, vec![oldest, middle]);
        assert_eq!(report.bytes_freed, 200);
        assert_eq!(report.used_before, 300);
        assert_eq!(report.used_after, 100);
        assert!(newest.exists());
    }

    #[test]
    fn test_under_limit_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.avi", 100, 10);
        let report = StorageQuotaEnforcer::new(dir.path(), 100).enforce(&[]).unwrap();
        assert_eq!(report.evicted(), 0);
        assert_eq!(report.used_after, 100);
    }

    #[test]
    fn test_margin_evicts_further() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.avi", 100, 30);
        write_file(dir.path(), "b.avi", 100, 20);
        write_file(dir.path(), "c.avi", 100, 10);

        let report = StorageQuotaEnforcer::new(dir.path(), 250)
            .with_margin(100)
            .enforce(&[])
            .unwrap();
        assert_eq!(report.evicted(), 2);
        assert_eq!(report.used_after, 100);
    }

    #[test]
    fn test_protected_and_failed_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let active = write_file(dir.path(), "a.avi", 100, 30);
        let stuck = write_file(dir.path(), "b.avi", 100, 20);
        let old = write_file(dir.path(), "c.avi", 100, 10);

        let enforcer = StorageQuotaEnforcer::new(dir.path(), 150);
        let report = enforcer
            .enforce_with(&[active.clone()], |path| {
                if path == stuck {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
                } else {
                    std::fs::remove_file(path)
                }
            })
            .unwrap();

        assert_eq!(report.deleted, vec![old]);
        assert_eq!(report.failures, 1);
        assert_eq!(report.used_after, 200);
        assert!(active.exists());
        assert!(stuck.exists());
    }

    #[test]
    fn test_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "snapshot_cam0_20240101_000000.png", 500, 100);
        write_file(dir.path(), "a.avi", 100, 10);

        let files = list_recordings(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(directory_usage(dir.path()).unwrap(), 600);

        let report = StorageQuotaEnforcer::new(dir.path(), 50).enforce(&[]).unwrap();
        assert_eq!(report.evicted(), 1);
        assert!(dir.path().join("snapshot_cam0_20240101_000000.png").exists());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_recordings(&missing).unwrap().is_empty());
        assert_eq!(directory_usage(&missing).unwrap(), 0);
        assert_eq!(
            StorageQuotaEnforcer::new(&missing, 1).enforce(&[]).unwrap(),
            QuotaReport::default()
        );
    }

    #[test]
    fn test_clear_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let keep = write_file(dir.path(), "a.avi", 10, 10);
        write_file(dir.path(), "b.avi", 10, 10);
        write_file(dir.path(), "c.avi", 10, 10);

        assert_eq!(clear_recordings(dir.path(), &[keep.clone()]).unwrap(), 2);
        assert!(keep.exists());
    }

    #[test]
    fn test_storage_usage_display() {
        let gb = 1024_u64.pow(3);
        let usage = StorageUsage::new(2_254_857_830, 5 * gb);
        assert_eq!(usage.to_string(), "42% · 2.1 GB / 5 GB");
        assert!(!usage.is_over_limit());
        assert!(StorageUsage::new(2, 1).is_over_limit());
    }
}
