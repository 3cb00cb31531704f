//! # Distribution Service
//!
//! Owns the collaborators of the serving path (cache, catalog, layout) and
//! hands out the distributor and broker built on top of them. Constructed
//! once at startup and shared behind an `Arc`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shard_core::{FileLayout, ShardError};

use crate::cache::{BestEffortCache, CacheError, CacheStore};
use crate::catalog::MetadataCatalog;
use crate::distributor::FragmentDistributor;
use crate::session::SessionKeyBroker;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_root: PathBuf,
    /// Defaults to `<data_root>/metadata.json`.
    pub metadata_file: Option<PathBuf>,
    pub session_ttl: Duration,
    pub verify_disk_on_hit: bool,
}

impl ServiceConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            metadata_file: None,
            session_ttl: DEFAULT_SESSION_TTL,
            verify_disk_on_hit: true,
        }
    }
}

/// Result of a readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub artifacts: usize,
    pub cache: Result<(), CacheError>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.cache.is_ok()
    }
}

#[derive(Debug)]
pub struct DistributionService {
    layout: FileLayout,
    catalog: Arc<MetadataCatalog>,
    cache: BestEffortCache,
    distributor: FragmentDistributor,
    broker: SessionKeyBroker,
}

impl DistributionService {
    /// Load the metadata ledger and wire the serving components together.
    pub async fn open(config: ServiceConfig, cache: Arc<dyn CacheStore>) -> Result<Self, ShardError> {
        let layout = FileLayout::new(&config.data_root);
        let metadata_file = config
            .metadata_file
            .clone()
            .unwrap_or_else(|| layout.default_metadata_file());
        let catalog = Arc::new(MetadataCatalog::load(metadata_file).await?);
        Ok(Self::assemble(layout, catalog, cache, &config))
    }

    /// Wire the components around an already loaded catalog.
    pub fn assemble(
        layout: FileLayout,
        catalog: Arc<MetadataCatalog>,
        cache: Arc<dyn CacheStore>,
        config: &ServiceConfig,
    ) -> Self {
        let cache = BestEffortCache::new(cache);
        let distributor = FragmentDistributor::new(
            layout.clone(),
            catalog.clone(),
            cache.clone(),
            config.verify_disk_on_hit,
        );
        let broker = SessionKeyBroker::new(
            layout.clone(),
            catalog.clone(),
            cache.clone(),
            config.session_ttl,
        );
        Self {
            layout,
            catalog,
            cache,
            distributor,
            broker,
        }
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn catalog(&self) -> &MetadataCatalog {
        &self.catalog
    }

    pub fn distributor(&self) -> &FragmentDistributor {
        &self.distributor
    }

    pub fn broker(&self) -> &SessionKeyBroker {
        &self.broker
    }

    pub async fn reload_metadata(&self) -> Result<usize, ShardError> {
        self.catalog.reload().await
    }

    pub async fn readiness(&self) -> Readiness {
        Readiness {
            artifacts: self.catalog.snapshot().len(),
            cache: self.cache.ping().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::DownCache;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn open_on_empty_root_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let svc = DistributionService::open(ServiceConfig::new(dir.path()), Arc::new(MemoryCache::new()))
            .await
            .unwrap();
        let ready = svc.readiness().await;
        assert!(ready.is_ready());
        assert_eq!(ready.artifacts, 0);
    }

    #[tokio::test]
    async fn unreachable_cache_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let svc = DistributionService::open(ServiceConfig::new(dir.path()), Arc::new(DownCache))
            .await
            .unwrap();
        assert!(!svc.readiness().await.is_ready());
    }

    #[tokio::test]
    async fn corrupt_ledger_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("metadata.json"), b"[1, 2]").unwrap();
        let err = DistributionService::open(ServiceConfig::new(dir.path()), Arc::new(MemoryCache::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), shard_core::ErrorKind::Metadata);
    }
}
