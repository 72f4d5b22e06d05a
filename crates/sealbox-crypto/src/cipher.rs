//! AES-256-GCM bulk encryption with a per-file random key
//!
//! Ciphertext blob format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No associated data is bound. Each key encrypts exactly one file, so a
//! random nonce never repeats under the same key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use sealbox_core::{SealboxError, SealboxResult};
use zeroize::Zeroize;

use crate::{KEY_SIZE, NONCE_SIZE};

/// A per-file 256-bit encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Build a key from a slice, failing unless it is exactly `KEY_SIZE` long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self::from_bytes(array))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Fill `buf` from the OS CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> SealboxResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| SealboxError::RandomSourceUnavailable(e.to_string()))
}

/// Generate a random 256-bit file encryption key.
pub fn generate_key() -> SealboxResult<SymmetricKey> {
    let mut bytes = [0u8; KEY_SIZE];
    fill_random(&mut bytes)?;
    Ok(SymmetricKey::from_bytes(bytes))
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> SealboxResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SealboxError::Other(anyhow::anyhow!("AES-GCM encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Any failure (short blob, bad tag, wrong key) is `AuthenticationError`, and
/// no plaintext is returned.
pub fn decrypt(blob: &[u8], key: &SymmetricKey) -> SealboxResult<Vec<u8>> {
    if blob.len() < NONCE_SIZE {
        return Err(SealboxError::AuthenticationError);
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SealboxError::AuthenticationError)
}
