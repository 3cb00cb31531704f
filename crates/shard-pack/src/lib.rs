//! # shard-pack: Offline Artifact Publishing
//!
//! Implements the maintenance side of the distribution pipeline:
//!
//! - **Backup Manager** (`backup.rs`): write-once, timestamped snapshots of
//!   files and directory trees taken before anything is replaced.
//!
//! - **Metadata/Version Manager** (`ledger.rs`): the versioned ledger,
//!   strict version policy, atomic save.
//!
//! - **Fragmenter** (`fragmenter.rs`): split, encrypt one fragment, hash,
//!   and name fragments with decoy extensions.
//!
//! - **Publish pipeline** (`publish.rs`): runs the three above for a batch
//!   of artifacts. New trees are staged and only installed once the ledger
//!   is saved.
//!
//! - **Reconstruction** (`reconstruct.rs`): client-side reassembly used to
//!   verify what is on disk.
//!
//! ## Crate Policy
//!
//! - Depends on `shard-core` and `shard-crypto` internally.
//! - Synchronous I/O only. Maintenance runs are single-threaded and
//!   serialized by the operator.

pub mod backup;
pub mod fragmenter;
pub mod ledger;
pub mod publish;
pub mod reconstruct;

pub use backup::BackupManager;
pub use fragmenter::{
    split_ranges, FragmentOutcome, FragmentPlan, Fragmenter, PreparedArtifact, StagedArtifact,
    DECOY_EXTENSIONS, DEFAULT_ENCRYPTED_INDEX, DEFAULT_FRAGMENT_COUNT,
};
pub use ledger::MetadataManager;
pub use publish::{publish, PublishConfig, PublishReport, PublishRequest};
pub use reconstruct::{reconstruct, verify_artifact, VerifyReport};
