//! # shard CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shard_cli::config::DEFAULT_CONFIG_FILE;
use shard_cli::exit_code;
use shard_cli::fragment::{run_fragment, FragmentArgs};
use shard_cli::show::{run_show, ShowArgs};
use shard_cli::verify::{run_verify, VerifyArgs};

/// Fragmented artifact publishing toolchain.
///
/// Splits artifacts into fragments, encrypts one of them, versions the
/// result in a metadata ledger and snapshots everything it replaces.
#[derive(Parser, Debug)]
#[command(name = "shard", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the catalog configuration.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fragment, encrypt and version catalog artifacts.
    Fragment(FragmentArgs),

    /// Verify published artifacts against the metadata ledger.
    Verify(VerifyArgs),

    /// Print the metadata ledger.
    Show(ShowArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = %cli.config.display(), "shard CLI starting");

    let result = match &cli.command {
        Commands::Fragment(args) => run_fragment(args, &cli.config),
        Commands::Verify(args) => run_verify(args, &cli.config),
        Commands::Show(args) => run_show(args, &cli.config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fragment_flags() {
        let cli = Cli::try_parse_from([
            "shard",
            "fragment",
            "--apply",
            "--artifact",
            "det",
            "--artifact",
            "cls",
            "--version",
            "det=2.0.0",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("shard.yaml"));
        let Commands::Fragment(args) = cli.command else {
            panic!("expected fragment");
        };
        assert!(args.apply);
        assert_eq!(args.artifacts.len(), 2);
        assert_eq!(args.versions[0].0.as_str(), "det");
        assert_eq!(args.versions[0].1, "2.0.0");
    }

    #[test]
    fn fragment_defaults_to_dry_run() {
        let cli = Cli::try_parse_from(["shard", "fragment"]).unwrap();
        let Commands::Fragment(args) = cli.command else {
            panic!("expected fragment");
        };
        assert!(!args.apply);
        assert!(args.artifacts.is_empty());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["shard", "verify", "-vv", "--config", "/etc/shard.yaml"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, PathBuf::from("/etc/shard.yaml"));
    }

    #[test]
    fn invalid_artifact_key_rejected_at_parse() {
        assert!(Cli::try_parse_from(["shard", "verify", "--artifact", "../x"]).is_err());
        assert!(Cli::try_parse_from(["shard", "fragment", "--version", "det"]).is_err());
    }
}
