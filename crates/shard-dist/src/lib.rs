//! # shard-dist: Cache-Backed Artifact Serving
//!
//! The online half of the pipeline. Everything here is async (tokio) and
//! read-only with respect to published data:
//!
//! - **Cache** (`cache.rs`): the `CacheStore` trait, an in-process store,
//!   and the best-effort wrapper that turns cache outages into warnings.
//! - **Catalog** (`catalog.rs`): hot-reloadable snapshot of the metadata
//!   ledger.
//! - **Distributor** (`distributor.rs`): verified, cache-first fragment and
//!   artifact delivery.
//! - **Session broker** (`session.rs`): session tokens and key redemption.
//! - **Service** (`service.rs`): constructs and owns all of the above.
//!
//! ## Crate Policy
//!
//! - Never serve bytes whose SHA-256 does not match metadata.
//! - Never log key material or the token-to-key mapping.

pub mod cache;
pub mod catalog;
pub mod distributor;
pub mod service;
pub mod session;

pub use cache::{BestEffortCache, CacheError, CacheStore, MemoryCache, DEFAULT_CACHE_CAPACITY};
pub use catalog::MetadataCatalog;
pub use distributor::{BlobSource, FragmentDistributor, ServedBlob, VersionInfo};
pub use service::{DistributionService, Readiness, ServiceConfig, DEFAULT_SESSION_TTL};
pub use session::{SessionGrant, SessionKeyBroker, SessionToken};
