//! # Metadata/Version Manager
//!
//! Owns the in-memory copy of the metadata ledger during a maintenance run.
//!
//! ## Version Policy
//!
//! - An explicit version must be strict `X.Y.Z` and strictly greater than the
//!   version already recorded for that artifact.
//! - Without an explicit version, the patch component of the recorded
//!   version is incremented. An artifact with no history starts from `1.0.0`,
//!   so its first published version is `1.0.1`.
//!
//! ## Persistence
//!
//! `save` rewrites the whole ledger through a sibling temp file, `fsync`
//! and `rename`, so readers see either the old or the new document, never a
//! partial one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use shard_core::{ArtifactKey, ArtifactRecord, MetadataDocument, RunMode, ShardError, Version};

#[derive(Debug, Clone)]
pub struct MetadataManager {
    path: PathBuf,
    document: MetadataDocument,
}

impl MetadataManager {
    /// Load the ledger at `path`. A missing or blank file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ShardError> {
        let path = path.into();
        let document = read_document(&path)?;
        tracing::debug!(path = %path.display(), artifacts = document.len(), "metadata loaded");
        Ok(Self { path, document })
    }

    /// Discard in-memory state and re-read the file.
    pub fn reload(&mut self) -> Result<(), ShardError> {
        self.document = read_document(&self.path)?;
        tracing::info!(path = %self.path.display(), artifacts = self.document.len(), "metadata reloaded");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &MetadataDocument {
        &self.document
    }

    pub fn get(&self, key: &ArtifactKey) -> Option<&ArtifactRecord> {
        self.document.get(key)
    }

    /// Version the next publication of `key` should carry.
    pub fn resolve_version(
        &self,
        key: &ArtifactKey,
        explicit: Option<&str>,
    ) -> Result<Version, ShardError> {
        let previous = self.get(key).map(|r| r.version);
        match explicit {
            Some(raw) => {
                let version = raw
                    .parse::<Version>()
                    .map_err(|e| e.with_key(key.as_str()))?;
                if let Some(prev) = previous {
                    if version <= prev {
                        return Err(ShardError::version(
                            Some(key.as_str()),
                            format!("version {version} is not greater than recorded {prev}"),
                        ));
                    }
                }
                Ok(version)
            }
            None => Ok(previous.unwrap_or(Version::BASELINE).next_patch()),
        }
    }

    /// Replace the record for `key` in memory. The version must still be
    /// strictly greater than the recorded one.
    pub fn record(&mut self, key: ArtifactKey, record: ArtifactRecord) -> Result<(), ShardError> {
        if let Some(prev) = self.get(&key) {
            if record.version <= prev.version {
                return Err(ShardError::version(
                    Some(key.as_str()),
                    format!(
                        "version {} is not greater than recorded {}",
                        record.version, prev.version
                    ),
                ));
            }
        }
        record.validate(&key)?;
        self.document.insert(key, record);
        Ok(())
    }

    /// Persist the ledger. Dry-run only logs what would be written.
    pub fn save(&self, mode: RunMode) -> Result<(), ShardError> {
        let bytes = self.document.to_json_pretty()?;
        if !mode.is_apply() {
            tracing::info!(
                path = %self.path.display(),
                artifacts = self.document.len(),
                bytes = bytes.len(),
                "dry run: would write metadata"
            );
            return Ok(());
        }
        write_atomic(&self.path, &bytes).map_err(|e| {
            ShardError::metadata(None, format!("write {}: {e}", self.path.display()))
        })?;
        tracing::info!(path = %self.path.display(), artifacts = self.document.len(), "metadata saved");
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<MetadataDocument, ShardError> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(MetadataDocument::new()),
        Ok(bytes) => MetadataDocument::from_json(&bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "metadata file not found, starting with an empty ledger");
            Ok(MetadataDocument::new())
        }
        Err(e) => Err(ShardError::metadata(
            None,
            format!("read {}: {e}", path.display()),
        )),
    }
}

/// Temp file next to `path`, fsync, then rename over it.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metadata.json".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
