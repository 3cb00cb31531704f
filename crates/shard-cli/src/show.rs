//! # `shard show`
//!
//! Prints the metadata ledger, as a table or as the raw JSON document.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use shard_pack::MetadataManager;

use crate::config::CatalogConfig;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Print the ledger as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

pub fn run_show(args: &ShowArgs, config_path: &Path) -> Result<u8> {
    let config = CatalogConfig::load(config_path)?;
    let ledger = MetadataManager::load(&config.metadata_file)?;
    let doc = ledger.document();

    if args.json {
        print!("{}", String::from_utf8_lossy(&doc.to_json_pretty()?));
        return Ok(0);
    }

    if doc.is_empty() {
        println!("Ledger {} is empty.", config.metadata_file.display());
        return Ok(0);
    }

    println!("{:<24} {:<10} {:<10} {:<16} SHA-256", "ARTIFACT", "VERSION", "FRAGMENTS", "ENCRYPTED");
    for (key, record) in doc.iter() {
        let fragments = if record.is_fragmented {
            record.fragments.len().to_string()
        } else {
            "whole".to_string()
        };
        let encrypted = record
            .encrypted_index()
            .map_or_else(|| "-".to_string(), |i| format!("#{i}"));
        println!(
            "{:<24} {:<10} {:<10} {:<16} {}",
            key.as_str(),
            record.version.to_string(),
            fragments,
            encrypted,
            record.sha256
        );
    }
    println!();
    println!("Total: {} artifact(s)", doc.len());
    Ok(0)
}
