//! # Symmetric Fragment Keys
//!
//! One 256-bit key is generated per fragmentation run and persisted to
//! `<root>/artifacts/<key>/key/<key>_key.bin`.
//!
//! ## Security
//!
//! - Key bytes are zeroized on drop.
//! - `Debug` never prints key bytes.
//! - Key files are created with mode `0600` on unix and replaced by
//!   rename, so a reader sees either the old key or the new one.
//! - Equality is constant-time.
//! - `SymmetricKey` does not implement `Serialize`; it can never end up in
//!   the metadata ledger by accident.

use std::fs;
use std::io::Write;
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use shard_core::ShardError;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A 256-bit AES key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a key from raw bytes, e.g. a key file or a cache entry.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ShardError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            ShardError::encryption(
                None,
                format!("key must be {KEY_LEN} bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Key files
// ---------------------------------------------------------------------------

/// Write `key` to `path` with owner-only permissions, creating parent
/// directories as needed. The bytes go to a temp file in the same
/// directory which is then renamed over `path`.
pub fn write_key_file(path: &Path, key: &SymmetricKey) -> Result<(), ShardError> {
    let fail = |e: std::io::Error| {
        ShardError::encryption(None, format!("write key file {}: {e}", path.display()))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(fail)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "key.bin".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&tmp)?;
        // `mode` only applies on creation; tighten a leftover temp file too.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(key.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(fail)
}

/// Read a key file. A missing file is `NotFound`; a file of the wrong
/// length is an `Encryption` error.
pub fn read_key_file(path: &Path) -> Result<SymmetricKey, ShardError> {
    let mut bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ShardError::not_found(
                None,
                format!("key file {} does not exist", path.display()),
            ))
        }
        Err(e) => {
            return Err(ShardError::encryption(
                None,
                format!("read key file {}: {e}", path.display()),
            ))
        }
    };
    let key = SymmetricKey::from_slice(&bytes);
    bytes.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use shard_core::ErrorKind;

    #[test]
    fn generated_keys_differ() {
        let a = SymmetricKey::generate();
        let b = SymmetricKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn debug_is_redacted() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_LEN]);
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("ab"));
        assert!(!dbg.contains("171"));
        assert!(dbg.contains("redacted"));
    }

    #[test]
    fn equality_compares_every_byte() {
        let mut other = [7u8; KEY_LEN];
        let a = SymmetricKey::from_bytes(other);
        assert_eq!(a, SymmetricKey::from_bytes(other));
        other[KEY_LEN - 1] ^= 1;
        assert_ne!(a, SymmetricKey::from_bytes(other));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(SymmetricKey::from_slice(&[0u8; 32]).is_ok());
        let err = SymmetricKey::from_slice(&[0u8; 16]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encryption);
    }

    #[test]
    fn key_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det").join("key").join("det_key.bin");
        let key = SymmetricKey::generate();
        write_key_file(&path, &key).unwrap();
        assert_eq!(read_key_file(&path).unwrap(), key);
        assert_eq!(fs::metadata(&path).unwrap().len(), KEY_LEN as u64);
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.bin");
        fs::write(&path, b"old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_key_file(&path, &SymmetricKey::generate()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn rewrite_replaces_key_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det_key.bin");
        write_key_file(&path, &SymmetricKey::from_bytes([1; KEY_LEN])).unwrap();
        let second = SymmetricKey::from_bytes([2; KEY_LEN]);
        write_key_file(&path, &second).unwrap();

        assert_eq!(read_key_file(&path).unwrap(), second);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["det_key.bin".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_directory_keeps_old_key() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det_key.bin");
        let first = SymmetricKey::from_bytes([1; KEY_LEN]);
        write_key_file(&path, &first).unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o500)).unwrap();

        let result = write_key_file(&path, &SymmetricKey::from_bytes([2; KEY_LEN]));
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();
        // Running as root ignores directory permissions.
        if let Err(err) = result {
            assert_eq!(err.kind(), ErrorKind::Encryption);
            assert_eq!(read_key_file(&path).unwrap(), first);
        }
    }

    #[test]
    fn missing_key_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_key_file(&dir.path().join("absent.bin")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn truncated_key_file_is_encryption_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, [1u8; 10]).unwrap();
        assert_eq!(read_key_file(&path).unwrap_err().kind(), ErrorKind::Encryption);
    }
}
