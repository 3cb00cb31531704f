//! # Publish Pipeline
//!
//! Orchestrates one maintenance run over a set of artifacts:
//!
//! 1. Load the ledger and resolve every requested version.
//! 2. Fragment and encrypt every artifact with a readable source in memory
//!    and record the results in the in-memory ledger.
//! 3. Snapshot each published tree that is about to be replaced.
//! 4. Stage every new tree under `<root>/staging/`.
//! 5. Snapshot the metadata file, then save the ledger.
//! 6. Install the staged trees.
//!
//! Steps 1 to 2 do no I/O beyond reading sources. An error in steps 3 to 5
//! discards the staged trees, so published fragments, keys and metadata
//! stay as they were. Sources that do not exist are skipped with a warning
//! and reported in [`PublishReport::skipped`].

use std::path::PathBuf;

use shard_core::{ArtifactKey, FileLayout, RunMode, ShardError, Version};

use crate::backup::BackupManager;
use crate::fragmenter::{FragmentOutcome, FragmentPlan, Fragmenter, StagedArtifact};
use crate::ledger::MetadataManager;

/// One artifact to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub key: ArtifactKey,
    pub source: PathBuf,
    /// Explicit `X.Y.Z`; `None` auto-increments the patch.
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub layout: FileLayout,
    pub metadata_file: PathBuf,
    pub backup_dir: PathBuf,
    pub plan: FragmentPlan,
    pub mode: RunMode,
}

impl PublishConfig {
    /// Defaults derived from a data root.
    pub fn for_root(root: impl Into<PathBuf>, mode: RunMode) -> Self {
        let layout = FileLayout::new(root);
        Self {
            metadata_file: layout.default_metadata_file(),
            backup_dir: layout.default_backup_dir(),
            layout,
            plan: FragmentPlan::default(),
            mode,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishReport {
    pub mode: RunMode,
    pub published: Vec<FragmentOutcome>,
    pub skipped: Vec<ArtifactKey>,
    pub backups: Vec<PathBuf>,
}

/// Run the pipeline for `requests`.
pub fn publish(config: &PublishConfig, requests: &[PublishRequest]) -> Result<PublishReport, ShardError> {
    let mut ledger = MetadataManager::load(&config.metadata_file)?;

    let mut planned: Vec<(&PublishRequest, Version)> = Vec::with_capacity(requests.len());
    for req in requests {
        if planned.iter().any(|(r, _)| r.key == req.key) {
            return Err(ShardError::version(
                Some(req.key.as_str()),
                "artifact requested more than once",
            ));
        }
        let version = ledger.resolve_version(&req.key, req.version.as_deref())?;
        planned.push((req, version));
    }

    let backups = BackupManager::new(&config.backup_dir, config.mode);
    let fragmenter = Fragmenter::new(config.layout.clone(), config.plan, config.mode);
    let mut report = PublishReport {
        mode: config.mode,
        published: Vec::new(),
        skipped: Vec::new(),
        backups: Vec::new(),
    };

    let mut prepared = Vec::with_capacity(planned.len());
    for (req, version) in planned {
        if !req.source.is_file() {
            tracing::warn!(
                artifact = %req.key,
                path = %req.source.display(),
                "artifact source not found, skipping"
            );
            report.skipped.push(req.key.clone());
            continue;
        }
        let artifact = fragmenter.prepare_file(&req.key, &req.source, version)?;
        ledger.record(req.key.clone(), artifact.outcome().record.clone())?;
        prepared.push(artifact);
    }

    if prepared.is_empty() {
        tracing::info!("no artifacts published, metadata unchanged");
        return Ok(report);
    }

    for artifact in &prepared {
        let key = &artifact.outcome().key;
        let tree = config.layout.artifact_dir(key);
        if let Some(snapshot) = backups.snapshot(&tree).map_err(|e| e.with_key(key.as_str()))? {
            report.backups.push(snapshot);
        }
    }

    let mut staged: Vec<StagedArtifact> = Vec::with_capacity(prepared.len());
    let committed = (|| {
        for artifact in &prepared {
            staged.push(fragmenter.stage(artifact)?);
        }
        if let Some(snapshot) = backups.snapshot(&config.metadata_file)? {
            report.backups.push(snapshot);
        }
        ledger.save(config.mode)
    })();
    if let Err(e) = committed {
        for tree in staged {
            tree.discard();
        }
        return Err(e);
    }

    let mut first_error = None;
    for tree in staged {
        let key = tree.key().clone();
        if let Err(e) = tree.install() {
            tracing::error!(artifact = %key, error = %e, "metadata saved but artifact tree not installed");
            first_error.get_or_insert(e);
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    report.published = prepared.into_iter().map(|p| p.into_outcome()).collect();
    Ok(report)
}
