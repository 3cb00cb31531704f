//! # Streaming SHA-256
//!
//! Hashes readers in fixed-size chunks so that verifying a large artifact
//! never buffers it whole. The async serving path applies the same chunk
//! size through tokio.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::Digest;
use shard_core::Sha256Digest;

/// Read size for incremental hashing (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Digest everything `reader` yields, returning the digest and byte count.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<(Sha256Digest, u64)> {
    let mut hasher = Sha256Digest::hasher();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((Sha256Digest::finish(hasher), total))
}

/// Digest a file on disk.
pub fn digest_file(path: &Path) -> io::Result<(Sha256Digest, u64)> {
    digest_reader(File::open(path)?)
}
