//! Maintenance flow through the CLI handlers against a temporary catalog.

use std::fs;
use std::path::{Path, PathBuf};

use shard_cli::exit_code;
use shard_cli::fragment::{run_fragment, FragmentArgs};
use shard_cli::show::{run_show, ShowArgs};
use shard_cli::verify::{run_verify, VerifyArgs};
use shard_core::ArtifactKey;

fn catalog(dir: &Path) -> PathBuf {
    fs::write(dir.join("det.pt"), (0..10_000u32).map(|i| (i % 256) as u8).collect::<Vec<_>>())
        .unwrap();
    let config = dir.join("shard.yaml");
    fs::write(
        &config,
        "data_root: data\nartifacts:\n  det:\n    source: det.pt\n  gone:\n    source: missing.pt\n",
    )
    .unwrap();
    config
}

fn fragment(apply: bool, versions: &[(&str, &str)]) -> FragmentArgs {
    FragmentArgs {
        apply,
        artifacts: vec![],
        versions: versions
            .iter()
            .map(|(k, v)| (ArtifactKey::new(*k).unwrap(), v.to_string()))
            .collect(),
    }
}

fn ledger(dir: &Path) -> serde_json::Value {
    serde_json::from_slice(&fs::read(dir.join("data/metadata.json")).unwrap()).unwrap()
}

// -- Dry Run ------------------------------------------------------------------

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = catalog(dir.path());

    assert_eq!(run_fragment(&fragment(false, &[]), &config).unwrap(), 0);
    assert!(!dir.path().join("data").exists());
}

// -- Publish, Verify, Show ----------------------------------------------------

#[test]
fn apply_then_verify_then_republish() {
    let dir = tempfile::tempdir().unwrap();
    let config = catalog(dir.path());

    assert_eq!(run_fragment(&fragment(true, &[]), &config).unwrap(), 0);
    let doc = ledger(dir.path());
    assert_eq!(doc["det"]["version"], "1.0.1");
    assert_eq!(doc["det"]["fragments"].as_array().unwrap().len(), 4);
    assert!(doc.get("gone").is_none());

    assert_eq!(run_verify(&VerifyArgs { artifacts: vec![] }, &config).unwrap(), 0);
    assert_eq!(run_show(&ShowArgs { json: false }, &config).unwrap(), 0);

    assert_eq!(run_fragment(&fragment(true, &[]), &config).unwrap(), 0);
    assert_eq!(ledger(dir.path())["det"]["version"], "1.0.2");
    assert!(dir.path().join("data/backups").read_dir().unwrap().count() >= 2);

    assert_eq!(run_fragment(&fragment(true, &[("det", "2.0.0")]), &config).unwrap(), 0);
    assert_eq!(ledger(dir.path())["det"]["version"], "2.0.0");
}

// -- Failures -----------------------------------------------------------------

#[test]
fn non_increasing_version_fails_with_version_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = catalog(dir.path());
    run_fragment(&fragment(true, &[]), &config).unwrap();

    let err = run_fragment(&fragment(true, &[("det", "1.0.1")]), &config).unwrap_err();
    assert_eq!(exit_code(&err), 14);
    assert_eq!(ledger(dir.path())["det"]["version"], "1.0.1");
}

#[test]
fn tampered_fragment_fails_verify_with_integrity_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = catalog(dir.path());
    run_fragment(&fragment(true, &[]), &config).unwrap();

    let name = ledger(dir.path())["det"]["fragments"][0]["filename"]
        .as_str()
        .unwrap()
        .to_string();
    let path = dir.path().join("data/artifacts/det/fragments").join(name);
    let mut bytes = fs::read(&path).unwrap();
    bytes[0] ^= 0x80;
    fs::write(&path, bytes).unwrap();

    let err = run_verify(&VerifyArgs { artifacts: vec![] }, &config).unwrap_err();
    assert_eq!(exit_code(&err), 15);
}

#[test]
fn missing_config_is_generic_failure() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_show(&ShowArgs { json: true }, &dir.path().join("nope.yaml")).unwrap_err();
    assert_eq!(exit_code(&err), 1);
}
