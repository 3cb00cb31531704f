//! # shard-core: Foundational Types for Fragmented Artifact Distribution
//!
//! Every other crate in the workspace depends on `shard-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Validated newtypes.** `ArtifactKey`, `Version` and `Sha256Digest` are
//!    checked at construction and at deserialization. A key that could escape
//!    its directory or break the session-token grammar never gets past parsing.
//!
//! 2. **One error taxonomy.** `ShardError` carries a kind tag, a message and
//!    the artifact key involved. Callers match on `kind()` exhaustively.
//!
//! 3. **Constant-time digest comparison.** Checksums are compared with
//!    `subtle`, never with `==` on hex strings.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `shard-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod digest;
pub mod error;
pub mod identity;
pub mod layout;
pub mod metadata;
pub mod version;

pub use digest::Sha256Digest;
pub use error::{ErrorKind, ShardError};
pub use identity::ArtifactKey;
pub use layout::FileLayout;
pub use metadata::{is_safe_file_name, ArtifactRecord, FragmentRecord, MetadataDocument};
pub use version::Version;

/// Whether a maintenance operation touches the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Perform all writes.
    Apply,
    /// Compute and log everything, write nothing.
    DryRun,
}

impl RunMode {
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::Apply)
    }
}
