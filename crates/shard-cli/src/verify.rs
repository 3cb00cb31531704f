//! # `shard verify`
//!
//! Re-checks published artifacts against the ledger: every fragment digest,
//! the key file, decryption, and the whole-artifact digest. All selected
//! artifacts are checked; the first failure decides the exit status.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use shard_core::{ArtifactKey, ShardError};
use shard_pack::{verify_artifact, MetadataManager};

use crate::config::CatalogConfig;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Artifacts to verify. Repeatable; default is every ledger entry.
    #[arg(long = "artifact", value_name = "KEY")]
    pub artifacts: Vec<ArtifactKey>,
}

pub fn run_verify(args: &VerifyArgs, config_path: &Path) -> Result<u8> {
    let config = CatalogConfig::load(config_path)?;
    let ledger = MetadataManager::load(&config.metadata_file)?;
    let layout = config.layout();

    let selected: Vec<ArtifactKey> = if args.artifacts.is_empty() {
        ledger.document().iter().map(|(k, _)| k.clone()).collect()
    } else {
        args.artifacts.clone()
    };

    let mut first_failure: Option<ShardError> = None;
    for key in &selected {
        let result = ledger
            .get(key)
            .ok_or_else(|| ShardError::not_found(Some(key.as_str()), "artifact is not in the ledger"))
            .and_then(|record| verify_artifact(&layout, key, record));
        match result {
            Ok(report) => println!(
                "  OK    {} {} ({} bytes, {} fragments)",
                report.key, report.version, report.bytes, report.fragments_checked
            ),
            Err(e) => {
                println!("  FAIL  {key}: {e}");
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) => Err(e.into()),
        None => {
            println!("Verified {} artifact(s).", selected.len());
            Ok(0)
        }
    }
}
