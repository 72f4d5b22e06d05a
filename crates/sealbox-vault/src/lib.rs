//! sealbox-vault: where sealed items live and how batches of them move
//!
//! - [`store`]: the `BlobStore` seam plus an in-memory store
//! - [`fs`]: filesystem store with atomic writes and per-operation timeouts
//! - [`collect`]: walk a source tree into named inputs
//! - [`sink`]: where restored plaintext goes
//! - [`batch`]: bounded concurrent seal/open with per-item reports

pub mod batch;
pub mod collect;
pub mod fs;
pub mod sink;
pub mod store;

pub use batch::{BatchSummary, ItemReport, Outcome, Vault};
pub use collect::{collect_inputs, CollectConfig, InputSource, SealInput};
pub use fs::FsBlobStore;
pub use sink::{DirectorySink, MemorySink, RestoreSink};
pub use store::{BlobId, BlobKind, BlobStore, MemoryBlobStore};
