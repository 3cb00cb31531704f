//! # Fragmenter
//!
//! Splits an artifact into contiguous fragments, encrypts one of them, and
//! produces the metadata record that is the only way to put the pieces back
//! together.
//!
//! ## Algorithm
//!
//! 1. Split `total` bytes into `N` ranges. The first `N - 1` take
//!    `total / N` bytes each and the last absorbs the remainder.
//! 2. Generate a fresh 256-bit key. Encrypt only the fragment at
//!    `encrypted_index`, storing `IV ‖ ciphertext`.
//! 3. Hash the whole original and every stored fragment (post-encryption
//!    for the protected one).
//! 4. Name each fragment `<key>_chunk_<16 hex>` plus a decoy extension drawn
//!    from [`DECOY_EXTENSIONS`]. Names say nothing about position or content.
//!
//! ## Phases
//!
//! [`Fragmenter::prepare_bytes`] does all of the above in memory and can
//! fail without touching disk. [`Fragmenter::stage`] writes the fragments
//! and key into `<root>/staging/<key>`. [`StagedArtifact::install`] swaps
//! the staged tree in for the published one with directory renames. The
//! publish pipeline installs only after the ledger is saved, so a failed
//! run leaves every published tree as the saved ledger describes it.
//!
//! In dry-run mode staging and installing only log.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use shard_core::layout::{FRAGMENTS_DIR, KEY_DIR};
use shard_core::{
    ArtifactKey, ArtifactRecord, FileLayout, FragmentRecord, RunMode, Sha256Digest, ShardError,
    Version,
};
use shard_crypto::{encrypt_fragment, write_key_file, SymmetricKey};

/// Default number of fragments per artifact.
pub const DEFAULT_FRAGMENT_COUNT: usize = 4;

/// Default position of the encrypted fragment.
pub const DEFAULT_ENCRYPTED_INDEX: usize = 3;

/// Extensions fragment files are disguised with.
pub const DECOY_EXTENSIONS: [&str; 8] = [
    ".css", ".js", ".png", ".txt", ".svg", ".woff2", ".json", ".ico",
];

/// Fragment count and which fragment gets encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentPlan {
    count: usize,
    encrypted_index: usize,
}

impl FragmentPlan {
    pub fn new(count: usize, encrypted_index: usize) -> Result<Self, ShardError> {
        if count == 0 {
            return Err(ShardError::fragmentation(None, "fragment count must be at least 1"));
        }
        if encrypted_index >= count {
            return Err(ShardError::fragmentation(
                None,
                format!("encrypted index {encrypted_index} out of range for {count} fragments"),
            ));
        }
        Ok(Self {
            count,
            encrypted_index,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn encrypted_index(&self) -> usize {
        self.encrypted_index
    }
}

impl Default for FragmentPlan {
    fn default() -> Self {
        Self {
            count: DEFAULT_FRAGMENT_COUNT,
            encrypted_index: DEFAULT_ENCRYPTED_INDEX,
        }
    }
}

/// Byte ranges of `count` contiguous fragments covering `0..total`.
pub fn split_ranges(total: usize, count: usize) -> Result<Vec<Range<usize>>, ShardError> {
    if count == 0 {
        return Err(ShardError::fragmentation(None, "fragment count must be at least 1"));
    }
    if total < count {
        return Err(ShardError::fragmentation(
            None,
            format!("artifact of {total} bytes is too small for {count} fragments"),
        ));
    }
    let size = total / count;
    Ok((0..count)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == count { total } else { start + size };
            start..end
        })
        .collect())
}

/// Random fragment filename for `key`, e.g. `det_chunk_3fa1c09b2e7d4410.woff2`.
pub fn fragment_file_name<R: Rng + ?Sized>(key: &ArtifactKey, rng: &mut R) -> String {
    let token: u64 = rng.gen();
    let ext = DECOY_EXTENSIONS.choose(rng).copied().unwrap_or(".bin");
    format!("{}_chunk_{token:016x}{ext}", key.as_str())
}

/// Result of fragmenting one artifact.
#[derive(Debug, Clone)]
pub struct FragmentOutcome {
    pub key: ArtifactKey,
    pub record: ArtifactRecord,
    /// Plaintext length of each fragment, in order.
    pub plaintext_lengths: Vec<usize>,
    /// Stored length of each fragment, in order.
    pub stored_lengths: Vec<usize>,
}

impl FragmentOutcome {
    pub fn total_plaintext(&self) -> usize {
        self.plaintext_lengths.iter().sum()
    }
}

struct PreparedFragment {
    record: FragmentRecord,
    bytes: Vec<u8>,
}

/// A fragmented artifact held in memory: records, stored bytes and key.
pub struct PreparedArtifact {
    outcome: FragmentOutcome,
    fragments: Vec<PreparedFragment>,
    symmetric: SymmetricKey,
}

impl PreparedArtifact {
    pub fn outcome(&self) -> &FragmentOutcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> FragmentOutcome {
        self.outcome
    }
}

impl std::fmt::Debug for PreparedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedArtifact")
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// A tree written under `<root>/staging/<key>`, not yet visible.
#[derive(Debug)]
#[must_use = "a staged artifact must be installed or discarded"]
pub struct StagedArtifact {
    key: ArtifactKey,
    layout: FileLayout,
    /// `None` in dry-run mode.
    dir: Option<PathBuf>,
}

impl StagedArtifact {
    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    /// Replace the published tree with the staged one.
    ///
    /// The old tree is renamed aside first and restored if the new one
    /// cannot be moved in.
    pub fn install(self) -> Result<(), ShardError> {
        let Some(staged) = &self.dir else {
            tracing::info!(artifact = %self.key, "dry run: would install artifact tree");
            return Ok(());
        };
        let k = Some(self.key.as_str());
        let live = self.layout.artifact_dir(&self.key);
        let retired = self.layout.retired_dir(&self.key);

        remove_dir_if_present(&retired).map_err(|e| {
            ShardError::fragmentation(k, format!("clean {}: {e}", retired.display()))
        })?;
        if let Some(parent) = live.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ShardError::fragmentation(k, format!("create {}: {e}", parent.display()))
            })?;
        }

        let had_live = match fs::rename(&live, &retired) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(ShardError::fragmentation(
                    k,
                    format!("retire {}: {e}", live.display()),
                ))
            }
        };
        if let Err(e) = fs::rename(staged, &live) {
            if had_live {
                let _ = fs::rename(&retired, &live);
            }
            return Err(ShardError::fragmentation(
                k,
                format!("install {}: {e}", live.display()),
            ));
        }

        if had_live {
            if let Err(e) = fs::remove_dir_all(&retired) {
                tracing::warn!(artifact = %self.key, path = %retired.display(), error = %e, "could not remove retired tree");
            }
        }
        tracing::info!(artifact = %self.key, path = %live.display(), "artifact tree installed");
        Ok(())
    }

    /// Drop the staged tree, leaving the published one as it is.
    pub fn discard(self) {
        if let Some(staged) = &self.dir {
            if let Err(e) = remove_dir_if_present(staged) {
                tracing::warn!(artifact = %self.key, path = %staged.display(), error = %e, "could not remove staged tree");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fragmenter {
    layout: FileLayout,
    plan: FragmentPlan,
    mode: RunMode,
}

impl Fragmenter {
    pub fn new(layout: FileLayout, plan: FragmentPlan, mode: RunMode) -> Self {
        Self { layout, plan, mode }
    }

    pub fn plan(&self) -> FragmentPlan {
        self.plan
    }

    /// Fragment the file at `source` and publish it as `version` right away.
    pub fn fragment_file(
        &self,
        key: &ArtifactKey,
        source: &Path,
        version: Version,
    ) -> Result<FragmentOutcome, ShardError> {
        let prepared = self.prepare_file(key, source, version)?;
        self.publish_now(prepared)
    }

    /// Fragment an in-memory artifact and publish it right away.
    pub fn fragment_bytes(
        &self,
        key: &ArtifactKey,
        original_name: &str,
        data: &[u8],
        version: Version,
    ) -> Result<FragmentOutcome, ShardError> {
        let prepared = self.prepare_bytes(key, original_name, data, version)?;
        self.publish_now(prepared)
    }

    fn publish_now(&self, prepared: PreparedArtifact) -> Result<FragmentOutcome, ShardError> {
        self.stage(&prepared)?.install()?;
        Ok(prepared.into_outcome())
    }

    pub fn prepare_file(
        &self,
        key: &ArtifactKey,
        source: &Path,
        version: Version,
    ) -> Result<PreparedArtifact, ShardError> {
        let data = fs::read(source).map_err(|e| {
            ShardError::fragmentation(
                Some(key.as_str()),
                format!("read {}: {e}", source.display()),
            )
        })?;
        let original_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| key.as_str().to_string());
        self.prepare_bytes(key, &original_name, &data, version)
    }

    /// Split, encrypt, hash and name. No I/O.
    pub fn prepare_bytes(
        &self,
        key: &ArtifactKey,
        original_name: &str,
        data: &[u8],
        version: Version,
    ) -> Result<PreparedArtifact, ShardError> {
        let ranges = split_ranges(data.len(), self.plan.count)
            .map_err(|e| e.with_key(key.as_str()))?;
        let symmetric = SymmetricKey::generate();
        let mut rng = rand::thread_rng();
        let mut names = HashSet::with_capacity(ranges.len());

        let mut fragments = Vec::with_capacity(ranges.len());
        let mut plaintext_lengths = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.into_iter().enumerate() {
            let plain = &data[range];
            plaintext_lengths.push(plain.len());

            let is_encrypted = index == self.plan.encrypted_index;
            let bytes = if is_encrypted {
                encrypt_fragment(&symmetric, plain).map_err(|e| e.with_key(key.as_str()))?
            } else {
                plain.to_vec()
            };

            let mut filename = fragment_file_name(key, &mut rng);
            while !names.insert(filename.clone()) {
                filename = fragment_file_name(key, &mut rng);
            }

            fragments.push(PreparedFragment {
                record: FragmentRecord {
                    filename,
                    sha256: Sha256Digest::of(&bytes),
                    is_encrypted,
                },
                bytes,
            });
        }

        let stored_lengths = fragments.iter().map(|p| p.bytes.len()).collect();
        let record = ArtifactRecord {
            version,
            original_name: original_name.to_string(),
            sha256: Sha256Digest::of(data),
            is_fragmented: true,
            fragments: fragments.iter().map(|p| p.record.clone()).collect(),
            filename: None,
        };

        tracing::info!(
            artifact = %key,
            version = %record.version,
            fragments = record.fragments.len(),
            bytes = data.len(),
            "artifact fragmented"
        );
        Ok(PreparedArtifact {
            outcome: FragmentOutcome {
                key: key.clone(),
                record,
                plaintext_lengths,
                stored_lengths,
            },
            fragments,
            symmetric,
        })
    }

    /// Write a prepared artifact into its staging directory. A leftover
    /// staging tree from an interrupted run is replaced.
    pub fn stage(&self, prepared: &PreparedArtifact) -> Result<StagedArtifact, ShardError> {
        let key = &prepared.outcome.key;
        if !self.mode.is_apply() {
            for p in &prepared.fragments {
                tracing::info!(
                    artifact = %key,
                    fragment = %p.record.filename,
                    bytes = p.bytes.len(),
                    encrypted = p.record.is_encrypted,
                    "dry run: would write fragment"
                );
            }
            return Ok(StagedArtifact {
                key: key.clone(),
                layout: self.layout.clone(),
                dir: None,
            });
        }

        let dir = self.layout.staging_dir(key);
        let written = write_tree(&dir, prepared);
        if written.is_err() {
            let _ = remove_dir_if_present(&dir);
        }
        written?;
        Ok(StagedArtifact {
            key: key.clone(),
            layout: self.layout.clone(),
            dir: Some(dir),
        })
    }
}

fn write_tree(dir: &Path, prepared: &PreparedArtifact) -> Result<(), ShardError> {
    let key = &prepared.outcome.key;
    let k = Some(key.as_str());
    remove_dir_if_present(dir).map_err(|e| {
        ShardError::fragmentation(k, format!("clean {}: {e}", dir.display()))
    })?;

    let fragments_dir = dir.join(FRAGMENTS_DIR);
    fs::create_dir_all(&fragments_dir).map_err(|e| {
        ShardError::fragmentation(k, format!("create {}: {e}", fragments_dir.display()))
    })?;
    for p in &prepared.fragments {
        let path = fragments_dir.join(&p.record.filename);
        write_new_file(&path, &p.bytes).map_err(|e| {
            ShardError::fragmentation(k, format!("write {}: {e}", path.display()))
        })?;
        tracing::debug!(artifact = %key, fragment = %p.record.filename, "fragment staged");
    }

    let key_file = dir.join(KEY_DIR).join(FileLayout::key_file_name(key));
    write_key_file(&key_file, &prepared.symmetric).map_err(|e| e.with_key(key.as_str()))
}

fn remove_dir_if_present(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn write_new_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
