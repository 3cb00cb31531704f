//! # Shared Cache
//!
//! The serving path talks to a key-value cache through [`CacheStore`]
//! (`get`/`set`/`set_ex`/`delete`/`ping`). The cache is an accelerator and
//! a session-token store, never a source of truth: every blob read from it
//! is re-verified against metadata before it is served.
//!
//! [`BestEffortCache`] wraps any store and downgrades every failure to a
//! `warn!` plus a counter, so an unreachable cache degrades to disk reads
//! instead of failed requests.
//!
//! ## Key Grammar
//!
//! ```text
//! fragment:<artifact>:<version>:<filename>
//! artifact:<artifact>:<version>
//! encryption_key:<artifact>:<requester>:<nonce>
//! ```
//!
//! Embedding the version means a republished artifact never hits entries
//! cached for the previous version.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use shard_core::{ArtifactKey, Version};
use thiserror::Error;

/// Failure talking to the cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backend cannot be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The backend was reached but the operation failed.
    #[error("cache operation failed: {0}")]
    Backend(String),
}

/// Minimal key-value cache interface.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Set with a time-to-live. The entry disappears once `ttl` elapses.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

pub fn fragment_cache_key(artifact: &ArtifactKey, version: &Version, filename: &str) -> String {
    format!("fragment:{artifact}:{version}:{filename}")
}

pub fn artifact_cache_key(artifact: &ArtifactKey, version: &Version) -> String {
    format!("artifact:{artifact}:{version}")
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

/// Default byte budget of a [`MemoryCache`]: 256 MiB.
pub const DEFAULT_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
    last_used: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    bytes: usize,
    clock: u64,
}

impl Entries {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.map.remove(key) {
            self.bytes -= old.value.len();
        }
    }

    fn drop_expired(&mut self, now: Instant) {
        let mut freed = 0;
        self.map.retain(|_, e| {
            let live = e.is_live(now);
            if !live {
                freed += e.value.len();
            }
            live
        });
        self.bytes -= freed;
    }

    fn evict_lru(&mut self) -> bool {
        let Some(oldest) = self
            .map
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
        else {
            return false;
        };
        self.remove(&oldest);
        true
    }
}

/// In-process cache with lazy expiry and a byte budget.
///
/// Expired entries are dropped when read. When a write would exceed the
/// budget, expired entries go first, then the least recently used ones.
/// A value larger than the whole budget is not stored.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` bytes of values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().map.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by stored values, expired or not.
    pub fn size_bytes(&self) -> usize {
        self.entries.lock().bytes
    }

    fn insert(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.remove(key);
        if value.len() > self.capacity {
            tracing::debug!(key, bytes = value.len(), capacity = self.capacity, "value exceeds cache capacity, not cached");
            return;
        }

        if entries.bytes + value.len() > self.capacity {
            entries.drop_expired(now);
        }
        while entries.bytes + value.len() > self.capacity && entries.evict_lru() {}

        let last_used = entries.tick();
        entries.bytes += value.len();
        entries.map.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: ttl.map(|d| now + d),
                last_used,
            },
        );
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let live = match entries.map.get(key) {
            Some(e) => e.is_live(now),
            None => return Ok(None),
        };
        if !live {
            entries.remove(key);
            return Ok(None);
        }
        let tick = entries.tick();
        Ok(entries.map.get_mut(key).map(|e| {
            e.last_used = tick;
            e.value.clone()
        }))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        self.insert(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, value, Some(ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Best-effort wrapper
// ---------------------------------------------------------------------------

/// A cache whose failures never reach the caller.
#[derive(Clone)]
pub struct BestEffortCache {
    inner: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for BestEffortCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BestEffortCache").finish_non_exhaustive()
    }
}

impl BestEffortCache {
    pub fn new(inner: Arc<dyn CacheStore>) -> Self {
        Self { inner }
    }

    /// Read an entry; failures read as a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.inner.get(key).await {
            Ok(v) => v,
            Err(e) => {
                cache_failure("get", &e);
                None
            }
        }
    }

    /// Write an entry; returns whether the write succeeded.
    pub async fn set(&self, key: &str, value: &[u8]) -> bool {
        match self.inner.set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                cache_failure("set", &e);
                false
            }
        }
    }

    pub async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> bool {
        match self.inner.set_ex(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                cache_failure("setex", &e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.inner.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                cache_failure("delete", &e);
                false
            }
        }
    }

    /// Reachability check, surfaced as-is for readiness checks.
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.inner.ping().await
    }
}

fn cache_failure(op: &'static str, err: &CacheError) {
    metrics::counter!("shard_cache_errors_total", "op" => op).increment(1);
    tracing::warn!(op, error = %err, "cache operation failed, continuing without cache");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A cache that is always unreachable.
    #[derive(Debug, Default)]
    pub(crate) struct DownCache;

    #[async_trait]
    impl CacheStore for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn set_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn memory_cache_get_set_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.set("k", b"v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new();
        cache.set_ex("short", b"v", Duration::from_millis(20)).await.unwrap();
        cache.set_ex("long", b"v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.get("long").await.unwrap().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn memory_cache_stays_within_capacity() {
        let cache = MemoryCache::with_capacity(100);
        for version in 0..10 {
            cache.set(&format!("artifact:det:1.0.{version}"), &[version as u8; 40]).await.unwrap();
            assert!(cache.size_bytes() <= 100);
        }
        assert_eq!(cache.len(), 2);
        // Only the newest versions survive.
        assert!(cache.get("artifact:det:1.0.9").await.unwrap().is_some());
        assert!(cache.get("artifact:det:1.0.8").await.unwrap().is_some());
        assert_eq!(cache.get("artifact:det:1.0.0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_evicts_least_recently_used() {
        let cache = MemoryCache::with_capacity(30);
        cache.set("a", &[1; 10]).await.unwrap();
        cache.set("b", &[2; 10]).await.unwrap();
        cache.set("c", &[3; 10]).await.unwrap();
        cache.get("a").await.unwrap();

        cache.set("d", &[4; 10]).await.unwrap();
        assert!(cache.get("a").await.unwrap().is_some());
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.size_bytes(), 30);
    }

    #[tokio::test]
    async fn memory_cache_skips_oversized_values() {
        let cache = MemoryCache::with_capacity(8);
        cache.set("k", b"small").await.unwrap();
        cache.set("k", &[0; 9]).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.size_bytes(), 0);
    }

    #[tokio::test]
    async fn overwrite_does_not_double_count() {
        let cache = MemoryCache::with_capacity(64);
        cache.set("k", &[0; 20]).await.unwrap();
        cache.set("k", &[1; 30]).await.unwrap();
        assert_eq!(cache.size_bytes(), 30);
        cache.delete("k").await.unwrap();
        assert_eq!(cache.size_bytes(), 0);
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let cache = BestEffortCache::new(Arc::new(DownCache));
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.set("k", b"v").await);
        assert!(!cache.set_ex("k", b"v", Duration::from_secs(1)).await);
        assert!(!cache.delete("k").await);
        assert!(cache.ping().await.is_err());
    }

    #[test]
    fn cache_keys_embed_version() {
        let key = ArtifactKey::new("det").unwrap();
        let v = Version::new(1, 0, 3);
        assert_eq!(
            fragment_cache_key(&key, &v, "det_chunk_aa.css"),
            "fragment:det:1.0.3:det_chunk_aa.css"
        );
        assert_eq!(artifact_cache_key(&key, &v), "artifact:det:1.0.3");
    }
}
