//! # shard-crypto: Cryptographic Primitives
//!
//! Provides the cryptographic building blocks for fragment protection:
//!
//! - **Symmetric keys**: 256-bit, zeroized on drop, persisted to owner-only
//!   key files.
//! - **Fragment cipher**: AES-256-CBC + PKCS#7 with an IV-prefixed stored
//!   form.
//! - **Streaming SHA-256** over files and readers.
//!
//! ## Crate Policy
//!
//! - Depends only on `shard-core` internally.
//! - No mocking of cryptographic operations in tests: all tests use real
//!   AES and real SHA-256.
//! - Key bytes never reach `Debug`, `Display` or serde.

pub mod cipher;
pub mod key;
pub mod sha256;

pub use cipher::{decrypt_fragment, encrypt_fragment, IV_LEN};
pub use key::{read_key_file, write_key_file, SymmetricKey, KEY_LEN};
pub use sha256::{digest_file, digest_reader, CHUNK_SIZE};
