//! # Backup Manager
//!
//! Snapshots a file or directory tree into the backup area before it is
//! replaced. Snapshot names carry a second-resolution UTC timestamp:
//!
//! - file `metadata.json` → `metadata_20260118_093012.json`
//! - directory `artifacts/text_detector` → `text_detector_20260118_093012`
//!
//! If that name is already taken (two runs within one second), a `_<n>`
//! counter is appended. Existing snapshots are never overwritten: files are
//! opened with `create_new`, so a race loses with an error instead of
//! clobbering.
//!
//! A failed copy leaves nothing behind. Directory trees are copied under a
//! hidden `.<name>.partial` name and renamed into place once complete; a
//! partially written file snapshot is removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use shard_core::{RunMode, ShardError};

/// Timestamp format used in snapshot names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    mode: RunMode,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>, mode: RunMode) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            mode,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot `target` (file or directory) at the current time.
    ///
    /// Returns the snapshot path, or `None` when the target does not exist
    /// or the manager runs in dry-run mode.
    pub fn snapshot(&self, target: &Path) -> Result<Option<PathBuf>, ShardError> {
        self.snapshot_at(target, Utc::now())
    }

    /// Snapshot with an explicit timestamp.
    pub fn snapshot_at(
        &self,
        target: &Path,
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, ShardError> {
        let meta = match fs::metadata(target) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %target.display(), "backup target does not exist, skipping");
                return Ok(None);
            }
            Err(e) => {
                return Err(ShardError::backup(
                    None,
                    format!("stat {}: {e}", target.display()),
                ))
            }
        };

        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let dest = self.unique_destination(target, meta.is_dir(), &stamp)?;

        if !self.mode.is_apply() {
            tracing::info!(
                path = %target.display(),
                snapshot = %dest.display(),
                "dry run: would take backup snapshot"
            );
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            ShardError::backup(
                None,
                format!("create backup dir {}: {e}", self.backup_dir.display()),
            )
        })?;

        let copied = if meta.is_dir() {
            copy_tree(target, &dest)
        } else {
            copy_file_once(target, &dest)
        };
        copied.map_err(|e| {
            ShardError::backup(
                None,
                format!("copy {} to {}: {e}", target.display(), dest.display()),
            )
        })?;

        tracing::info!(path = %target.display(), snapshot = %dest.display(), "backup snapshot taken");
        Ok(Some(dest))
    }

    fn unique_destination(
        &self,
        target: &Path,
        is_dir: bool,
        stamp: &str,
    ) -> Result<PathBuf, ShardError> {
        let (stem, ext) = split_name(target, is_dir).ok_or_else(|| {
            ShardError::backup(None, format!("cannot name a snapshot of {}", target.display()))
        })?;

        let candidate = |suffix: &str| {
            let name = match &ext {
                Some(ext) => format!("{stem}_{stamp}{suffix}.{ext}"),
                None => format!("{stem}_{stamp}{suffix}"),
            };
            self.backup_dir.join(name)
        };

        let mut dest = candidate("");
        let mut n = 1u32;
        while dest.symlink_metadata().is_ok() {
            dest = candidate(&format!("_{n}"));
            n += 1;
        }
        Ok(dest)
    }
}

/// Split a target into the name stem and the extension used for its
/// snapshot. Directories keep their full name.
fn split_name(target: &Path, is_dir: bool) -> Option<(String, Option<String>)> {
    if is_dir {
        let name = target.file_name()?.to_string_lossy().into_owned();
        return Some((name, None));
    }
    let stem = target.file_stem()?.to_string_lossy().into_owned();
    let ext = target
        .extension()
        .map(|e| e.to_string_lossy().into_owned());
    Some((stem, ext))
}

/// Copy one file to a destination that must not exist yet. On failure the
/// destination is removed again.
fn copy_file_once(src: &Path, dest: &Path) -> io::Result<()> {
    let mut input = fs::File::open(src)?;
    let mut output = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    let result = (|| {
        io::copy(&mut input, &mut output)?;
        output.sync_all()?;
        fs::set_permissions(dest, input.metadata()?.permissions())
    })();
    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

/// Copy a directory tree to `dest` through a hidden staging name, so a
/// snapshot directory only ever appears complete.
fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "snapshot has no name"))?;
    let partial = dest.with_file_name(format!(".{name}.partial"));
    if partial.symlink_metadata().is_ok() {
        fs::remove_dir_all(&partial)?;
    }

    let result = copy_tree_into(src, &partial).and_then(|()| fs::rename(&partial, dest));
    if result.is_err() {
        let _ = fs::remove_dir_all(&partial);
    }
    result
}

fn copy_tree_into(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree_into(&from, &to)?;
        } else {
            copy_file_once(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 18, 9, 30, 12).unwrap()
    }

    #[test]
    fn file_snapshot_name_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("metadata.json");
        fs::write(&target, b"{}").unwrap();
        let mgr = BackupManager::new(dir.path().join("backups"), RunMode::Apply);

        let snap = mgr.snapshot_at(&target, at()).unwrap().unwrap();
        assert_eq!(snap.file_name().unwrap(), "metadata_20260118_093012.json");
        assert_eq!(fs::read(&snap).unwrap(), b"{}");
    }

    #[test]
    fn directory_snapshot_copies_tree() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("det");
        fs::create_dir_all(target.join("fragments")).unwrap();
        fs::write(target.join("fragments").join("a.css"), b"aaa").unwrap();
        fs::create_dir_all(target.join("key")).unwrap();
        fs::write(target.join("key").join("det_key.bin"), [1u8; 32]).unwrap();
        let mgr = BackupManager::new(dir.path().join("backups"), RunMode::Apply);

        let snap = mgr.snapshot_at(&target, at()).unwrap().unwrap();
        assert_eq!(snap.file_name().unwrap(), "det_20260118_093012");
        assert_eq!(fs::read(snap.join("fragments").join("a.css")).unwrap(), b"aaa");
        assert_eq!(fs::read(snap.join("key").join("det_key.bin")).unwrap(), [1u8; 32]);
    }

    #[test]
    fn same_second_snapshots_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("metadata.json");
        let mgr = BackupManager::new(dir.path().join("backups"), RunMode::Apply);

        fs::write(&target, b"first").unwrap();
        let a = mgr.snapshot_at(&target, at()).unwrap().unwrap();
        fs::write(&target, b"second").unwrap();
        let b = mgr.snapshot_at(&target, at()).unwrap().unwrap();

        assert_ne!(a, b);
        assert_eq!(b.file_name().unwrap(), "metadata_20260118_093012_1.json");
        assert_eq!(fs::read(&a).unwrap(), b"first");
        assert_eq!(fs::read(&b).unwrap(), b"second");
    }

    #[test]
    fn missing_target_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = BackupManager::new(dir.path().join("backups"), RunMode::Apply);
        let out = mgr.snapshot(&dir.path().join("absent")).unwrap();
        assert!(out.is_none());
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn dry_run_copies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("metadata.json");
        fs::write(&target, b"{}").unwrap();
        let mgr = BackupManager::new(dir.path().join("backups"), RunMode::DryRun);

        assert!(mgr.snapshot(&target).unwrap().is_none());
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn unusable_backup_dir_is_backup_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("metadata.json");
        fs::write(&target, b"{}").unwrap();
        // A regular file where the backup directory should be.
        let blocker = dir.path().join("backups");
        fs::write(&blocker, b"").unwrap();

        let mgr = BackupManager::new(&blocker, RunMode::Apply);
        let err = mgr.snapshot(&target).unwrap_err();
        assert_eq!(err.kind(), shard_core::ErrorKind::Backup);
    }

    #[cfg(unix)]
    #[test]
    fn failed_tree_copy_leaves_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("det");
        fs::create_dir_all(target.join("fragments")).unwrap();
        fs::write(target.join("fragments").join("a.css"), b"aaa").unwrap();
        // Dangling link: opening it for the copy fails.
        std::os::unix::fs::symlink(dir.path().join("gone"), target.join("fragments").join("b.js"))
            .unwrap();
        let backups = dir.path().join("backups");
        let mgr = BackupManager::new(&backups, RunMode::Apply);

        let err = mgr.snapshot_at(&target, at()).unwrap_err();
        assert_eq!(err.kind(), shard_core::ErrorKind::Backup);
        assert_eq!(fs::read_dir(&backups).unwrap().count(), 0);
    }
}
