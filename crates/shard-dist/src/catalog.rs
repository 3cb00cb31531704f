//! # Metadata Catalog
//!
//! Read-only view of the metadata ledger for the serving path. Readers take
//! a cheap `Arc` snapshot; `reload` swaps the snapshot atomically so a
//! request never observes a half-updated ledger.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use shard_core::{ArtifactKey, ArtifactRecord, MetadataDocument, ShardError};

#[derive(Debug)]
pub struct MetadataCatalog {
    path: Option<PathBuf>,
    current: RwLock<Arc<MetadataDocument>>,
}

impl MetadataCatalog {
    /// Load the ledger at `path`. A missing file yields an empty catalog.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ShardError> {
        let path = path.into();
        let doc = read_document(&path).await?;
        tracing::info!(path = %path.display(), artifacts = doc.len(), "metadata catalog loaded");
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(doc)),
        })
    }

    /// A catalog over an in-memory document, with no backing file.
    pub fn from_document(doc: MetadataDocument) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(doc)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the backing file. On failure the previous snapshot stays in
    /// place. Returns the number of artifacts now loaded.
    pub async fn reload(&self) -> Result<usize, ShardError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot().len());
        };
        let doc = read_document(path).await?;
        let count = doc.len();
        *self.current.write() = Arc::new(doc);
        tracing::info!(path = %path.display(), artifacts = count, "metadata catalog reloaded");
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<MetadataDocument> {
        Arc::clone(&self.current.read())
    }

    /// Record for `key`, or `NotFound`.
    pub fn record(&self, key: &ArtifactKey) -> Result<ArtifactRecord, ShardError> {
        self.snapshot()
            .get(key)
            .cloned()
            .ok_or_else(|| ShardError::not_found(Some(key.as_str()), "unknown artifact"))
    }
}

async fn read_document(path: &Path) -> Result<MetadataDocument, ShardError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(MetadataDocument::new()),
        Ok(bytes) => MetadataDocument::from_json(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "metadata file not found, serving nothing");
            Ok(MetadataDocument::new())
        }
        Err(e) => Err(ShardError::metadata(
            None,
            format!("read {}: {e}", path.display()),
        )),
    }
}
