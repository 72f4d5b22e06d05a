//! Per-item encryption and decryption pipelines
//!
//! ```text
//! encrypt: Pending → KeyGenerated → BulkEncrypted → MetadataPacked → MetadataWrapped → Emitted
//! decrypt: Pending → MetadataUnwrapped → MetadataUnpacked → BulkDecrypted → Restored
//! ```
//!
//! Stages advance strictly in order. The first failing stage's error is
//! returned unchanged; nothing produced before it leaves the function.

use std::fmt;

use sealbox_core::{SealboxError, SealboxResult};
use tracing::{debug, trace};

use crate::cipher;
use crate::envelope::{self, SealedEnvelope};
use crate::wrap::{UnwrappingKey, WrappingKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptStage {
    Pending,
    KeyGenerated,
    BulkEncrypted,
    MetadataPacked,
    MetadataWrapped,
    Emitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptStage {
    Pending,
    MetadataUnwrapped,
    MetadataUnpacked,
    BulkDecrypted,
    Restored,
}

impl fmt::Display for EncryptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::KeyGenerated => "key-generated",
            Self::BulkEncrypted => "bulk-encrypted",
            Self::MetadataPacked => "metadata-packed",
            Self::MetadataWrapped => "metadata-wrapped",
            Self::Emitted => "emitted",
        };
        f.write_str(s)
    }
}

impl fmt::Display for DecryptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::MetadataUnwrapped => "metadata-unwrapped",
            Self::MetadataUnpacked => "metadata-unpacked",
            Self::BulkDecrypted => "bulk-decrypted",
            Self::Restored => "restored",
        };
        f.write_str(s)
    }
}

/// Output of a successful decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredItem {
    pub name: String,
    pub plaintext: Vec<u8>,
}

/// Seal one item: fresh file key, bulk encrypt, pack `{name, key}`, wrap.
pub fn encrypt_item(
    name: &str,
    plaintext: &[u8],
    public: &impl WrappingKey,
) -> SealboxResult<SealedEnvelope> {
    let mut stage = EncryptStage::Pending;
    let result = (|| -> SealboxResult<SealedEnvelope> {
        let key = cipher::generate_key()?;
        advance_encrypt(&mut stage, EncryptStage::KeyGenerated, name);

        let ciphertext = cipher::encrypt(plaintext, &key)?;
        advance_encrypt(&mut stage, EncryptStage::BulkEncrypted, name);

        let metadata = envelope::pack_metadata(name, &key)?;
        advance_encrypt(&mut stage, EncryptStage::MetadataPacked, name);

        let max = public.max_payload_len();
        if metadata.len() > max {
            return Err(SealboxError::PayloadTooLarge {
                len: metadata.len(),
                max,
            });
        }
        let wrapped_key = public.wrap_payload(&metadata)?;
        advance_encrypt(&mut stage, EncryptStage::MetadataWrapped, name);

        Ok(SealedEnvelope::new(ciphertext, wrapped_key))
    })();

    match result {
        Ok(sealed) => {
            advance_encrypt(&mut stage, EncryptStage::Emitted, name);
            Ok(sealed)
        }
        Err(e) => {
            debug!(name, reached = %stage, kind = %e.kind(), "encryption failed");
            Err(e)
        }
    }
}

/// Open one item: unwrap metadata, unpack `{name, key}`, bulk decrypt.
pub fn decrypt_item(
    wrapped_key: &[u8],
    ciphertext: &[u8],
    private: &impl UnwrappingKey,
) -> SealboxResult<RestoredItem> {
    let mut stage = DecryptStage::Pending;
    let result = (|| -> SealboxResult<RestoredItem> {
        let metadata = private.unwrap_payload(wrapped_key)?;
        advance_decrypt(&mut stage, DecryptStage::MetadataUnwrapped);

        let (name, key) = envelope::unpack_metadata(&metadata)?;
        advance_decrypt(&mut stage, DecryptStage::MetadataUnpacked);

        let plaintext = cipher::decrypt(ciphertext, &key)?;
        advance_decrypt(&mut stage, DecryptStage::BulkDecrypted);

        Ok(RestoredItem { name, plaintext })
    })();

    match result {
        Ok(item) => {
            advance_decrypt(&mut stage, DecryptStage::Restored);
            Ok(item)
        }
        Err(e) => {
            debug!(reached = %stage, kind = %e.kind(), "decryption failed");
            Err(e)
        }
    }
}

fn advance_encrypt(stage: &mut EncryptStage, next: EncryptStage, name: &str) {
    trace!(name, from = %stage, to = %next, "encrypt stage");
    *stage = next;
}

fn advance_decrypt(stage: &mut DecryptStage, next: DecryptStage) {
    trace!(from = %stage, to = %next, "decrypt stage");
    *stage = next;
}
