//! Envelope codec: the wrapped metadata record and the sealed blob pair
//!
//! Metadata is compact JSON, wrapped as a single RSA block:
//! ```text
//! {"filename":"<relative name>","key":"<base64 of 32-byte AES key>"}
//! ```
//!
//! A sealed item is two blobs stored under one id: the ciphertext and the
//! wrapped key. For single-file storage they can be joined into a bundle:
//! ```text
//! [4 bytes: "SBX1"][4 bytes: wrapped_len, u32 BE][wrapped key][ciphertext]
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sealbox_core::{SealboxError, SealboxResult};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::SymmetricKey;
use crate::KEY_SIZE;

pub const BUNDLE_MAGIC: [u8; 4] = *b"SBX1";

const BUNDLE_HEADER_LEN: usize = BUNDLE_MAGIC.len() + 4;

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct MetadataRecord {
    filename: String,
    /// Base64 (standard alphabet, padded)
    key: String,
}

/// Serialize `{filename, key}` for wrapping.
pub fn pack_metadata(name: &str, key: &SymmetricKey) -> SealboxResult<Zeroizing<Vec<u8>>> {
    validate_name(name)?;
    let record = MetadataRecord {
        filename: name.to_string(),
        key: STANDARD.encode(key.as_bytes()),
    };
    serde_json::to_vec(&record)
        .map(Zeroizing::new)
        .map_err(|e| SealboxError::MalformedMetadata(format!("serializing metadata: {e}")))
}

/// Parse unwrapped metadata back into the original name and file key.
pub fn unpack_metadata(bytes: &[u8]) -> SealboxResult<(String, SymmetricKey)> {
    let record: MetadataRecord = serde_json::from_slice(bytes)
        .map_err(|e| SealboxError::MalformedMetadata(format!("parsing metadata: {e}")))?;

    let key_bytes = Zeroizing::new(
        STANDARD
            .decode(record.key.as_bytes())
            .map_err(|e| SealboxError::MalformedMetadata(format!("key is not base64: {e}")))?,
    );
    let key = SymmetricKey::from_slice(&key_bytes).ok_or_else(|| {
        SealboxError::MalformedMetadata(format!(
            "key has wrong size: {} bytes (expected {KEY_SIZE})",
            key_bytes.len()
        ))
    })?;

    validate_name(&record.filename)?;
    Ok((record.filename.clone(), key))
}

/// Check that `name` is a safe relative path.
///
/// Anyone holding the public key can mint an envelope, so a name must never
/// be able to escape the restore directory.
pub fn validate_name(name: &str) -> SealboxResult<()> {
    let reject = |why: &str| Err(SealboxError::MalformedMetadata(format!("unsafe name {name:?}: {why}")));

    if name.is_empty() {
        return reject("empty");
    }
    if name.starts_with('/') {
        return reject("absolute path");
    }
    if name.contains('\\') || name.contains('\0') {
        return reject("contains a backslash or NUL");
    }
    for component in name.split('/') {
        match component {
            "" => return reject("empty path component"),
            "." | ".." => return reject("relative path component"),
            _ => {}
        }
    }
    Ok(())
}

/// The immutable output of one encryption: ciphertext plus wrapped key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    ciphertext: Vec<u8>,
    wrapped_key: Vec<u8>,
}

impl SealedEnvelope {
    pub fn new(ciphertext: Vec<u8>, wrapped_key: Vec<u8>) -> Self {
        Self {
            ciphertext,
            wrapped_key,
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    /// `(ciphertext, wrapped_key)`
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.ciphertext, self.wrapped_key)
    }

    /// Join both halves into one self-delimiting blob.
    pub fn to_bundle(&self) -> SealboxResult<Vec<u8>> {
        let wrapped_len = u32::try_from(self.wrapped_key.len()).map_err(|_| {
            SealboxError::MalformedEnvelope(format!(
                "wrapped key too long for bundle: {} bytes",
                self.wrapped_key.len()
            ))
        })?;

        let mut out =
            Vec::with_capacity(BUNDLE_HEADER_LEN + self.wrapped_key.len() + self.ciphertext.len());
        out.extend_from_slice(&BUNDLE_MAGIC);
        out.extend_from_slice(&wrapped_len.to_be_bytes());
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&self.ciphertext);
        Ok(out)
    }

    /// Split a bundle produced by [`SealedEnvelope::to_bundle`].
    pub fn from_bundle(data: &[u8]) -> SealboxResult<Self> {
        if data.len() < BUNDLE_HEADER_LEN {
            return Err(SealboxError::MalformedEnvelope(format!(
                "bundle too short: {} bytes (minimum {BUNDLE_HEADER_LEN})",
                data.len()
            )));
        }
        let (magic, rest) = data.split_at(BUNDLE_MAGIC.len());
        if magic != BUNDLE_MAGIC {
            return Err(SealboxError::MalformedEnvelope("bad bundle magic".into()));
        }

        let (len_bytes, rest) = rest.split_at(4);
        let mut len_buf = [0u8; 4];
        len_buf.copy_from_slice(len_bytes);
        let wrapped_len = u32::from_be_bytes(len_buf) as usize;

        if wrapped_len > rest.len() {
            return Err(SealboxError::MalformedEnvelope(format!(
                "wrapped key length {wrapped_len} exceeds bundle body of {} bytes",
                rest.len()
            )));
        }
        let (wrapped_key, ciphertext) = rest.split_at(wrapped_len);
        Ok(Self::new(ciphertext.to_vec(), wrapped_key.to_vec()))
    }
}
