//! # Fragment Cipher
//!
//! AES-256-CBC with PKCS#7 padding. The stored form of an encrypted
//! fragment is `IV ‖ ciphertext`, where the IV is 16 fresh random bytes.
//! Clients reconstruct by taking the first 16 bytes as the IV, decrypting
//! the rest and stripping the padding.
//!
//! Ciphertext length is always a positive multiple of the block size, so
//! a stored fragment is at least 32 bytes.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use shard_core::ShardError;

use crate::key::SymmetricKey;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size and IV length.
pub const IV_LEN: usize = 16;

/// Encrypt `plaintext` under a fresh random IV and return `IV ‖ ciphertext`.
pub fn encrypt_fragment(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, ShardError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    encrypt_with_iv(key, &iv, plaintext)
}

/// Encrypt with a caller-chosen IV. Only [`encrypt_fragment`] should be
/// used for published fragments.
pub fn encrypt_with_iv(
    key: &SymmetricKey,
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, ShardError> {
    let enc = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| ShardError::encryption(None, format!("cipher init: {e}")))?;
    let ciphertext = enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse [`encrypt_fragment`]: split off the IV, decrypt, strip padding.
pub fn decrypt_fragment(key: &SymmetricKey, stored: &[u8]) -> Result<Vec<u8>, ShardError> {
    if stored.len() < 2 * IV_LEN || (stored.len() - IV_LEN) % IV_LEN != 0 {
        return Err(ShardError::encryption(
            None,
            format!("encrypted fragment has invalid length {}", stored.len()),
        ));
    }
    let (iv, ciphertext) = stored.split_at(IV_LEN);
    let dec = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| ShardError::encryption(None, format!("cipher init: {e}")))?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| ShardError::encryption(None, "bad padding after decryption"))
}

/// Length of the stored form for a plaintext of `len` bytes.
pub fn stored_len(len: usize) -> usize {
    IV_LEN + (len / IV_LEN + 1) * IV_LEN
}
