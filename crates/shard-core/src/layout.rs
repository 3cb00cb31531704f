//! # On-Disk Layout
//!
//! Every path the pipeline touches is derived from a single data root:
//!
//! ```text
//! <root>/
//!   metadata.json                     default ledger location
//!   artifacts/<key>/fragments/<file>  published fragments
//!   artifacts/<key>/key/<key>_key.bin symmetric key, mode 0600
//!   full/<file>                       unfragmented artifacts
//!   backups/                          timestamped snapshots
//!   staging/<key>/                    next artifact tree, before install
//! ```
//!
//! A staged tree has the same `fragments/` and `key/` shape as a published
//! one, so installing it is a single directory rename.

use std::path::{Path, PathBuf};

use crate::identity::ArtifactKey;

/// Fragment subdirectory of an artifact tree.
pub const FRAGMENTS_DIR: &str = "fragments";

/// Key subdirectory of an artifact tree.
pub const KEY_DIR: &str = "key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    root: PathBuf,
}

impl FileLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn default_metadata_file(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    pub fn default_backup_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// `<root>/artifacts/<key>`: everything published for one artifact.
    pub fn artifact_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join("artifacts").join(key.as_str())
    }

    pub fn fragments_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.artifact_dir(key).join(FRAGMENTS_DIR)
    }

    /// Caller must have checked `filename` against metadata first.
    pub fn fragment_path(&self, key: &ArtifactKey, filename: &str) -> PathBuf {
        self.fragments_dir(key).join(filename)
    }

    pub fn key_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.artifact_dir(key).join(KEY_DIR)
    }

    pub fn key_file(&self, key: &ArtifactKey) -> PathBuf {
        self.key_dir(key).join(Self::key_file_name(key))
    }

    pub fn key_file_name(key: &ArtifactKey) -> String {
        format!("{}_key.bin", key.as_str())
    }

    /// `<root>/staging/<key>`: a fully written tree waiting to replace
    /// [`artifact_dir`](Self::artifact_dir).
    pub fn staging_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join("staging").join(key.as_str())
    }

    /// Where the previous tree is parked while a staged one is installed.
    pub fn retired_dir(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join("staging").join(format!("{}.retired", key.as_str()))
    }

    pub fn full_dir(&self) -> PathBuf {
        self.root.join("full")
    }

    pub fn full_path(&self, filename: &str) -> PathBuf {
        self.full_dir().join(filename)
    }
}
