//! # `shard fragment`
//!
//! Publishes catalog artifacts: back up, fragment, encrypt, and record a new
//! version in the metadata ledger. Without `--apply` the run is a dry run
//! that logs every step and writes nothing.
//!
//! ```bash
//! shard fragment                              # dry run over the whole catalog
//! shard fragment --apply --artifact det       # publish one artifact
//! shard fragment --apply --version det=2.0.0  # explicit version
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use shard_core::{ArtifactKey, RunMode, ShardError};
use shard_pack::{publish, PublishReport, PublishRequest};

use crate::config::CatalogConfig;

#[derive(Args, Debug)]
pub struct FragmentArgs {
    /// Write fragments, keys, backups and metadata. Dry run otherwise.
    #[arg(long)]
    pub apply: bool,

    /// Restrict the run to these artifacts. Repeatable; default is all.
    #[arg(long = "artifact", value_name = "KEY")]
    pub artifacts: Vec<ArtifactKey>,

    /// Explicit version for an artifact. Repeatable.
    #[arg(long = "version", value_name = "KEY=X.Y.Z", value_parser = parse_version_override)]
    pub versions: Vec<(ArtifactKey, String)>,
}

fn parse_version_override(raw: &str) -> Result<(ArtifactKey, String), String> {
    let (key, version) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=X.Y.Z, got {raw:?}"))?;
    let key = ArtifactKey::new(key).map_err(|e| e.to_string())?;
    if version.is_empty() {
        return Err(format!("missing version for {key}"));
    }
    Ok((key, version.to_string()))
}

/// Turn CLI selection into publish requests.
pub fn build_requests(config: &CatalogConfig, args: &FragmentArgs) -> Result<Vec<PublishRequest>, ShardError> {
    let selected: Vec<ArtifactKey> = if args.artifacts.is_empty() {
        config.artifacts.keys().cloned().collect()
    } else {
        let mut keys = args.artifacts.clone();
        keys.sort();
        keys.dedup();
        keys
    };

    let mut versions: BTreeMap<&ArtifactKey, &str> = BTreeMap::new();
    for (key, version) in &args.versions {
        if !selected.contains(key) {
            return Err(ShardError::version(
                Some(key.as_str()),
                "version given for an artifact that is not selected",
            ));
        }
        if versions.insert(key, version.as_str()).is_some() {
            return Err(ShardError::version(Some(key.as_str()), "version given more than once"));
        }
    }

    selected
        .iter()
        .map(|key| {
            Ok(PublishRequest {
                key: key.clone(),
                source: config.source(key)?.to_path_buf(),
                version: versions.get(key).map(|v| v.to_string()),
            })
        })
        .collect()
}

pub fn run_fragment(args: &FragmentArgs, config_path: &Path) -> Result<u8> {
    let config = CatalogConfig::load(config_path)?;
    let mode = if args.apply { RunMode::Apply } else { RunMode::DryRun };
    let requests = build_requests(&config, args)?;
    if requests.is_empty() {
        println!("No artifacts in catalog.");
        return Ok(0);
    }

    let report = publish(&config.publish_config(mode), &requests)?;
    print_report(&report);
    Ok(0)
}

fn print_report(report: &PublishReport) {
    let label = if report.mode.is_apply() { "published" } else { "would publish" };
    for outcome in &report.published {
        let record = &outcome.record;
        println!(
            "  {label}: {} {} ({} bytes, {} fragments, encrypted #{})",
            outcome.key,
            record.version,
            outcome.total_plaintext(),
            record.fragments.len(),
            record
                .encrypted_index()
                .map_or_else(|| "-".to_string(), |i| i.to_string()),
        );
    }
    for key in &report.skipped {
        println!("  skipped: {key} (source not found)");
    }
    for path in &report.backups {
        println!("  backup: {}", path.display());
    }
    if !report.mode.is_apply() {
        println!("  (dry run, nothing written; pass --apply to publish)");
    }
}
