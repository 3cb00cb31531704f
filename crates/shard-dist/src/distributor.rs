//! # Fragment Distributor
//!
//! Serves fragments and unfragmented artifacts cache-first, with every byte
//! verified against the metadata digest before it leaves the process.
//!
//! ```text
//! START -> CACHE_LOOKUP -> CACHE_HIT_VERIFY -> SERVE
//!                       \-> CACHE_MISS -> DISK_READ -> DISK_VERIFY -> SERVE | FAIL
//! ```
//!
//! A cache hit whose bytes fail verification, or whose disk copy has
//! drifted from metadata, is evicted and the request falls through to the
//! disk path. The disk path never serves bytes that fail verification.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sha2::Digest;
use shard_core::{ArtifactKey, FileLayout, Sha256Digest, ShardError, Version};
use shard_crypto::CHUNK_SIZE;
use tokio::io::AsyncReadExt;

use crate::cache::{artifact_cache_key, fragment_cache_key, BestEffortCache};
use crate::catalog::MetadataCatalog;

/// Where a served blob came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobSource {
    Cache,
    Disk,
}

impl BlobSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Disk => "disk",
        }
    }
}

/// Verified bytes plus what a response needs to describe them.
#[derive(Debug, Clone)]
pub struct ServedBlob {
    pub bytes: Vec<u8>,
    pub version: Version,
    pub sha256: Sha256Digest,
    pub source: BlobSource,
}

/// Public summary of an artifact's current version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub key: ArtifactKey,
    pub version: Version,
    pub original_name: String,
    pub sha256: Sha256Digest,
    pub is_fragmented: bool,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    CacheLookup,
    CacheHitVerify,
    CacheMiss,
    DiskRead,
    DiskVerify,
    Serve,
    Fail,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::CacheLookup => "cache_lookup",
            Self::CacheHitVerify => "cache_hit_verify",
            Self::CacheMiss => "cache_miss",
            Self::DiskRead => "disk_read",
            Self::DiskVerify => "disk_verify",
            Self::Serve => "serve",
            Self::Fail => "fail",
        }
    }
}

/// A blob the metadata says exists, resolved to its cache key and path.
struct Target<'a> {
    artifact: &'a ArtifactKey,
    label: &'a str,
    cache_key: String,
    path: PathBuf,
    expected: Sha256Digest,
    version: Version,
}

#[derive(Debug, Clone)]
pub struct FragmentDistributor {
    layout: FileLayout,
    catalog: Arc<MetadataCatalog>,
    cache: BestEffortCache,
    verify_disk_on_hit: bool,
}

impl FragmentDistributor {
    pub fn new(
        layout: FileLayout,
        catalog: Arc<MetadataCatalog>,
        cache: BestEffortCache,
        verify_disk_on_hit: bool,
    ) -> Self {
        Self {
            layout,
            catalog,
            cache,
            verify_disk_on_hit,
        }
    }

    /// Serve one fragment of a fragmented artifact.
    ///
    /// The filename must be listed under `artifact` in metadata; anything
    /// else is `NotFound` before a single byte is read or hashed.
    pub async fn fetch_fragment(
        &self,
        artifact: &str,
        filename: &str,
    ) -> Result<ServedBlob, ShardError> {
        let key: ArtifactKey = artifact.parse()?;
        let record = self.catalog.record(&key)?;
        let Some((_, fragment)) = record.fragment(filename) else {
            tracing::debug!(artifact = %key, fragment = filename, "fragment not listed for artifact");
            return Err(ShardError::not_found(
                Some(key.as_str()),
                format!("no fragment named {filename}"),
            ));
        };

        let target = Target {
            artifact: &key,
            label: filename,
            cache_key: fragment_cache_key(&key, &record.version, filename),
            path: self.layout.fragment_path(&key, filename),
            expected: fragment.sha256,
            version: record.version,
        };
        self.serve(target).await
    }

    /// Serve an unfragmented artifact whole from the `full/` area.
    pub async fn fetch_artifact(&self, artifact: &str) -> Result<ServedBlob, ShardError> {
        let key: ArtifactKey = artifact.parse()?;
        let record = self.catalog.record(&key)?;
        if record.is_fragmented {
            return Err(ShardError::not_found(
                Some(key.as_str()),
                "artifact is fragmented, fetch its fragments instead",
            ));
        }
        let filename = record.stored_file_name().ok_or_else(|| {
            ShardError::not_found(Some(key.as_str()), "artifact has no stored file")
        })?;

        let target = Target {
            artifact: &key,
            label: filename,
            cache_key: artifact_cache_key(&key, &record.version),
            path: self.layout.full_path(filename),
            expected: record.sha256,
            version: record.version,
        };
        self.serve(target).await
    }

    /// Version a fragment would be served at, with the same membership
    /// check as [`fetch_fragment`](Self::fetch_fragment) and no I/O.
    pub fn fragment_version(&self, artifact: &str, filename: &str) -> Result<Version, ShardError> {
        let key: ArtifactKey = artifact.parse()?;
        let record = self.catalog.record(&key)?;
        match record.fragment(filename) {
            Some(_) => Ok(record.version),
            None => Err(ShardError::not_found(
                Some(key.as_str()),
                format!("no fragment named {filename}"),
            )),
        }
    }

    pub fn artifact_version(&self, artifact: &str) -> Result<VersionInfo, ShardError> {
        let key: ArtifactKey = artifact.parse()?;
        let record = self.catalog.record(&key)?;
        Ok(VersionInfo {
            key,
            version: record.version,
            original_name: record.original_name,
            sha256: record.sha256,
            is_fragmented: record.is_fragmented,
        })
    }

    async fn serve(&self, target: Target<'_>) -> Result<ServedBlob, ShardError> {
        trace_stage(Stage::CacheLookup, &target);
        if let Some(bytes) = self.cache.get(&target.cache_key).await {
            trace_stage(Stage::CacheHitVerify, &target);
            if self.cached_blob_is_valid(&target, &bytes).await {
                return Ok(served(&target, bytes, BlobSource::Cache));
            }
            self.cache.delete(&target.cache_key).await;
        }
        trace_stage(Stage::CacheMiss, &target);

        trace_stage(Stage::DiskRead, &target);
        let (bytes, actual) = read_hashed(&target.path)
            .await
            .map_err(|e| io_error(target.artifact, &target.path, e))?;

        trace_stage(Stage::DiskVerify, &target);
        if !target.expected.matches(&actual) {
            trace_stage(Stage::Fail, &target);
            metrics::counter!("shard_integrity_failures_total").increment(1);
            tracing::error!(
                artifact = %target.artifact,
                fragment = target.label,
                version = %target.version,
                expected = %target.expected,
                actual = %actual,
                "stored bytes do not match metadata, refusing to serve"
            );
            return Err(ShardError::integrity(
                Some(target.artifact.as_str()),
                format!("{}: sha256 mismatch", target.label),
            ));
        }

        self.cache.set(&target.cache_key, &bytes).await;
        Ok(served(&target, bytes, BlobSource::Disk))
    }

    /// Check a cached blob, and optionally the disk copy behind it.
    async fn cached_blob_is_valid(&self, target: &Target<'_>, bytes: &[u8]) -> bool {
        if !target.expected.verifies(bytes) {
            tracing::warn!(
                artifact = %target.artifact,
                fragment = target.label,
                "cached blob failed verification, evicting"
            );
            return false;
        }
        if !self.verify_disk_on_hit {
            return true;
        }
        match hash_file(&target.path).await {
            Ok(disk) if target.expected.matches(&disk) => true,
            Ok(_) => {
                tracing::warn!(
                    artifact = %target.artifact,
                    fragment = target.label,
                    path = %target.path.display(),
                    "disk copy drifted from metadata, evicting cache entry"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    artifact = %target.artifact,
                    fragment = target.label,
                    path = %target.path.display(),
                    error = %e,
                    "disk copy unreadable, evicting cache entry"
                );
                false
            }
        }
    }
}

fn served(target: &Target<'_>, bytes: Vec<u8>, source: BlobSource) -> ServedBlob {
    trace_stage(Stage::Serve, target);
    metrics::counter!("shard_fragment_served_total", "source" => source.as_str()).increment(1);
    tracing::debug!(
        artifact = %target.artifact,
        fragment = target.label,
        version = %target.version,
        source = source.as_str(),
        bytes = bytes.len(),
        "blob served"
    );
    ServedBlob {
        bytes,
        version: target.version,
        sha256: target.expected,
        source,
    }
}

fn trace_stage(stage: Stage, target: &Target<'_>) {
    tracing::trace!(
        stage = stage.as_str(),
        artifact = %target.artifact,
        fragment = target.label,
        "distributor stage"
    );
}

fn io_error(artifact: &ArtifactKey, path: &Path, e: std::io::Error) -> ShardError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ShardError::not_found(Some(artifact.as_str()), format!("{} does not exist", path.display()))
    } else {
        ShardError::integrity(Some(artifact.as_str()), format!("read {}: {e}", path.display()))
    }
}

/// Read a file in `CHUNK_SIZE` pieces, hashing as it goes.
async fn read_hashed(path: &Path) -> std::io::Result<(Vec<u8>, Sha256Digest)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256Digest::hasher();
    let mut out = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        out.extend_from_slice(&buf[..n]);
    }
    Ok((out, Sha256Digest::finish(hasher)))
}

async fn hash_file(path: &Path) -> std::io::Result<Sha256Digest> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256Digest::hasher();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Sha256Digest::finish(hasher))
}
