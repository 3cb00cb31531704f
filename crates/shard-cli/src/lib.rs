//! # shard-cli: Maintenance Command-Line Interface
//!
//! ## Subcommands
//!
//! - `fragment`: publish catalog artifacts (dry run unless `--apply`)
//! - `verify`: re-check published artifacts against the ledger
//! - `show`: print the ledger
//!
//! ## Exit Codes
//!
//! | Code | Meaning                          |
//! |------|----------------------------------|
//! | 0    | success, including dry runs      |
//! | 1    | configuration or I/O failure     |
//! | 2    | usage error (clap)               |
//! | 10   | fragmentation error              |
//! | 11   | encryption error                 |
//! | 12   | metadata error                   |
//! | 13   | backup error                     |
//! | 14   | version error                    |
//! | 15   | integrity error                  |
//! | 16   | not found                        |
//!
//! ## Crate Policy
//!
//! - Argument parsing lives here; the work is done by `shard-pack`.

pub mod config;
pub mod fragment;
pub mod show;
pub mod verify;

use shard_core::{ErrorKind, ShardError};

/// Exit status for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ShardError>() {
        Some(e) => match e.kind() {
            ErrorKind::Fragmentation => 10,
            ErrorKind::Encryption => 11,
            ErrorKind::Metadata => 12,
            ErrorKind::Backup => 13,
            ErrorKind::Version => 14,
            ErrorKind::Integrity => 15,
            ErrorKind::NotFound => 16,
        },
        None => 1,
    }
}
