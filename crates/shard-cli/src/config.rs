//! # Catalog Configuration
//!
//! The `shard.yaml` file names the data root, the fragmentation plan, and
//! the artifacts the maintenance commands operate on:
//!
//! ```yaml
//! data_root: ./data
//! metadata_file: ./data/metadata.json   # optional
//! backup_dir: ./data/backups            # optional
//! fragment_count: 4
//! encrypted_index: 3
//! artifacts:
//!   det:
//!     source: ./models/det.pt
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use shard_core::{ArtifactKey, FileLayout, RunMode, ShardError};
use shard_pack::{FragmentPlan, PublishConfig, DEFAULT_ENCRYPTED_INDEX, DEFAULT_FRAGMENT_COUNT};

pub const DEFAULT_CONFIG_FILE: &str = "shard.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_data_root")]
    data_root: PathBuf,
    #[serde(default)]
    metadata_file: Option<PathBuf>,
    #[serde(default)]
    backup_dir: Option<PathBuf>,
    #[serde(default = "default_fragment_count")]
    fragment_count: usize,
    #[serde(default = "default_encrypted_index")]
    encrypted_index: usize,
    #[serde(default)]
    artifacts: BTreeMap<ArtifactKey, RawArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArtifact {
    source: PathBuf,
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_fragment_count() -> usize {
    DEFAULT_FRAGMENT_COUNT
}

fn default_encrypted_index() -> usize {
    DEFAULT_ENCRYPTED_INDEX
}

/// Loaded configuration with every path made absolute or config-relative.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub data_root: PathBuf,
    pub metadata_file: PathBuf,
    pub backup_dir: PathBuf,
    pub plan: FragmentPlan,
    /// Artifact key to source file.
    pub artifacts: BTreeMap<ArtifactKey, PathBuf>,
}

impl CatalogConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_yaml(&text, base).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml(text: &str, base: &Path) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        let plan = FragmentPlan::new(raw.fragment_count, raw.encrypted_index)?;

        let data_root = resolve(base, &raw.data_root);
        let layout = FileLayout::new(&data_root);
        let metadata_file = raw
            .metadata_file
            .map(|p| resolve(base, &p))
            .unwrap_or_else(|| layout.default_metadata_file());
        let backup_dir = raw
            .backup_dir
            .map(|p| resolve(base, &p))
            .unwrap_or_else(|| layout.default_backup_dir());
        let artifacts = raw
            .artifacts
            .into_iter()
            .map(|(key, a)| (key, resolve(base, &a.source)))
            .collect();

        Ok(Self {
            data_root,
            metadata_file,
            backup_dir,
            plan,
            artifacts,
        })
    }

    pub fn layout(&self) -> FileLayout {
        FileLayout::new(&self.data_root)
    }

    pub fn publish_config(&self, mode: RunMode) -> PublishConfig {
        PublishConfig {
            layout: self.layout(),
            metadata_file: self.metadata_file.clone(),
            backup_dir: self.backup_dir.clone(),
            plan: self.plan,
            mode,
        }
    }

    /// Source path of a configured artifact, or `NotFound`.
    pub fn source(&self, key: &ArtifactKey) -> Result<&Path, ShardError> {
        self.artifacts
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| ShardError::not_found(Some(key.as_str()), "artifact is not in the catalog"))
    }
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
