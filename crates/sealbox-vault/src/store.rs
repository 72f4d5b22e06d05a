//! Blob storage: ids, kinds, the `BlobStore` seam, and an in-memory store

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Mutex;

use rand::rngs::OsRng;
use rand::RngCore;
use sealbox_core::{SealboxError, SealboxResult};

const BLOB_ID_BYTES: usize = 8;

/// Shared identifier of one sealed item's blobs: 16 lowercase hex chars.
///
/// Random, so it says nothing about the item's original name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(String);

impl BlobId {
    /// Draw a fresh id from the OS random source.
    pub fn generate() -> SealboxResult<Self> {
        let mut bytes = [0u8; BLOB_ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SealboxError::RandomSourceUnavailable(e.to_string()))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Accept only the canonical form `generate` produces.
    pub fn parse(s: &str) -> Option<Self> {
        let canonical = s.len() == BLOB_ID_BYTES * 2
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        canonical.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobId {
    type Err = SealboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| SealboxError::MalformedEnvelope(format!("invalid blob id {s:?}")))
    }
}

/// Which half (or whole) of an envelope a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Ciphertext,
    WrappedKey,
    /// Wrapped key and ciphertext joined into one blob
    Bundle,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ciphertext => "ciphertext",
            Self::WrappedKey => "wrapped-key",
            Self::Bundle => "bundle",
        })
    }
}

/// Storage for envelope blobs, keyed by `(BlobId, BlobKind)`.
///
/// `put` must be atomic: a reader sees either nothing or the whole blob.
/// `get` of a missing blob fails with `Io` / `NotFound`; `remove` of a missing
/// blob succeeds.
pub trait BlobStore: Send + Sync + 'static {
    fn put(
        &self,
        id: &BlobId,
        kind: BlobKind,
        data: &[u8],
    ) -> impl Future<Output = SealboxResult<()>> + Send;

    fn get(&self, id: &BlobId, kind: BlobKind)
        -> impl Future<Output = SealboxResult<Vec<u8>>> + Send;

    fn contains(&self, id: &BlobId, kind: BlobKind)
        -> impl Future<Output = SealboxResult<bool>> + Send;

    /// Ids holding a blob of `kind`, sorted.
    fn list(&self, kind: BlobKind) -> impl Future<Output = SealboxResult<Vec<BlobId>>> + Send;

    fn remove(&self, id: &BlobId, kind: BlobKind)
        -> impl Future<Output = SealboxResult<()>> + Send;
}

pub(crate) fn not_found(id: &BlobId, kind: BlobKind) -> SealboxError {
    SealboxError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{kind} blob {id} not found"),
    ))
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(BlobId, BlobKind), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(BlobId, BlobKind), Vec<u8>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: &BlobId, kind: BlobKind, data: &[u8]) -> SealboxResult<()> {
        self.lock().insert((id.clone(), kind), data.to_vec());
        Ok(())
    }

    async fn get(&self, id: &BlobId, kind: BlobKind) -> SealboxResult<Vec<u8>> {
        self.lock()
            .get(&(id.clone(), kind))
            .cloned()
            .ok_or_else(|| not_found(id, kind))
    }

    async fn contains(&self, id: &BlobId, kind: BlobKind) -> SealboxResult<bool> {
        Ok(self.lock().contains_key(&(id.clone(), kind)))
    }

    async fn list(&self, kind: BlobKind) -> SealboxResult<Vec<BlobId>> {
        let mut ids: Vec<BlobId> = self
            .lock()
            .keys()
            .filter(|(_, k)| *k == kind)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn remove(&self, id: &BlobId, kind: BlobKind) -> SealboxResult<()> {
        self.lock().remove(&(id.clone(), kind));
        Ok(())
    }
}
