//! Bounded concurrent seal/open over a [`BlobStore`]
//!
//! One tokio task per item, admitted by a semaphore sized to the worker
//! count. Crypto runs on the blocking pool; I/O stays on the runtime. An
//! item's failure becomes its [`ItemReport`]; a fatal error stops admission
//! of further items and fails the whole run once in-flight items finish.
//!
//! Both directions delete only when asked to. Sealing removes a source file
//! after its whole envelope is stored; opening removes an envelope after the
//! sink has the restored item in place.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sealbox_core::config::{BatchConfig, Layout};
use sealbox_core::{ErrorKind, SealboxError, SealboxResult};
use sealbox_crypto::{
    decrypt_item, encrypt_item, RestoredItem, SealedEnvelope, UnwrappingKey, WrappingKey,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::collect::{InputSource, SealInput};
use crate::fs::timed;
use crate::sink::RestoreSink;
use crate::store::{BlobId, BlobKind, BlobStore};

/// Fresh ids tried before giving up on finding an unused one
const ID_ATTEMPTS: usize = 8;

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sealed { id: BlobId },
    Restored { name: String, location: String },
    Failed { kind: ErrorKind, message: String },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sealed { id } => write!(f, "sealed as {id}"),
            Self::Restored { name, location } => write!(f, "restored {name} to {location}"),
            Self::Failed { kind, message } => write!(f, "failed ({kind}): {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Input name when sealing, blob id when opening
    pub item: String,
    pub outcome: Outcome,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, Outcome::Failed { .. })
    }
}

/// Reports for every scheduled item, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub reports: Vec<ItemReport>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.reports.iter().filter(|r| !r.is_success())
    }
}

/// A blob store plus the policy for laying envelopes out in it.
pub struct Vault<S> {
    store: Arc<S>,
    layout: Layout,
    workers: usize,
    io_timeout: Duration,
}

impl<S: BlobStore> Vault<S> {
    pub fn new(store: S, layout: Layout, batch: &BatchConfig) -> Self {
        Self {
            store: Arc::new(store),
            layout,
            workers: batch.effective_workers().max(1),
            io_timeout: Duration::from_secs(batch.io_timeout_secs),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Ids of envelopes ready to open: wrapped keys (split) or bundles.
    pub async fn pending(&self) -> SealboxResult<Vec<BlobId>> {
        self.store.list(index_kind(self.layout)).await
    }

    /// Seal one input and store its envelope.
    pub async fn seal<K>(&self, input: SealInput, public: Arc<K>) -> SealboxResult<BlobId>
    where
        K: WrappingKey + Send + Sync + 'static,
    {
        seal_one(self.store.clone(), self.layout, self.io_timeout, input, public, false).await
    }

    /// Load and decrypt one envelope without writing or removing anything.
    pub async fn open<K>(&self, id: &BlobId, private: Arc<K>) -> SealboxResult<RestoredItem>
    where
        K: UnwrappingKey + Send + Sync + 'static,
    {
        open_one(self.store.as_ref(), self.layout, id, private).await
    }

    /// Seal every input concurrently, optionally deleting file sources once
    /// their envelopes are stored.
    pub async fn seal_all<K>(
        &self,
        inputs: Vec<SealInput>,
        public: Arc<K>,
        remove_sources: bool,
    ) -> SealboxResult<BatchSummary>
    where
        K: WrappingKey + Send + Sync + 'static,
    {
        let items = inputs
            .into_iter()
            .map(|input| (input.name.clone(), input))
            .collect();

        self.run_batch("seal", items, |input| {
            let store = self.store.clone();
            let public = public.clone();
            let (layout, io_timeout) = (self.layout, self.io_timeout);
            async move {
                seal_one(store, layout, io_timeout, input, public, remove_sources)
                    .await
                    .map(|id| Outcome::Sealed { id })
            }
        })
        .await
    }

    /// Open every pending envelope concurrently, handing plaintext to `sink`.
    pub async fn open_all<K, R>(
        &self,
        private: Arc<K>,
        sink: Arc<R>,
        remove_envelopes: bool,
    ) -> SealboxResult<BatchSummary>
    where
        K: UnwrappingKey + Send + Sync + 'static,
        R: RestoreSink,
    {
        let ids = self.pending().await?;
        let items = ids.into_iter().map(|id| (id.to_string(), id)).collect();

        self.run_batch("open", items, |id| {
            let store = self.store.clone();
            let private = private.clone();
            let sink = sink.clone();
            let layout = self.layout;
            async move { restore_one(store, layout, id, private, sink, remove_envelopes).await }
        })
        .await
    }

    async fn run_batch<T, F, Fut>(
        &self,
        op: &'static str,
        items: Vec<(String, T)>,
        work: F,
    ) -> SealboxResult<BatchSummary>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = SealboxResult<Outcome>> + Send + 'static,
    {
        let total = items.len();
        info!(op, total, workers = self.workers, "batch starting");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let halted = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for (index, (label, item)) in items.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SealboxError::Other(anyhow::anyhow!("worker pool closed")))?;
            if halted.load(Ordering::Acquire) {
                debug!(op, remaining = total - index, "fatal error seen, not scheduling the rest");
                break;
            }

            let fut = work(item);
            let halted = halted.clone();
            tasks.spawn(async move {
                let _permit = permit; // released when the item finishes
                // Inner task so a panic still reports against this item
                let result = match tokio::spawn(fut).await {
                    Ok(result) => result,
                    Err(e) => Err(SealboxError::Other(anyhow::anyhow!("worker task failed: {e}"))),
                };
                if matches!(&result, Err(e) if e.is_fatal()) {
                    halted.store(true, Ordering::Release);
                }
                (index, label, result)
            });
        }

        let mut reports = Vec::with_capacity(total);
        let mut fatal = None;
        while let Some(joined) = tasks.join_next().await {
            let (index, item, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(op, "batch task failed: {e}");
                    continue;
                }
            };

            let outcome = match result {
                Ok(outcome) => {
                    info!(op, %item, "{outcome}");
                    outcome
                }
                Err(e) if e.is_fatal() => {
                    error!(op, %item, kind = %e.kind(), "fatal: {e}");
                    fatal.get_or_insert(e);
                    continue;
                }
                Err(e) => {
                    warn!(op, %item, kind = %e.kind(), "item failed: {e}");
                    Outcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            reports.push((index, ItemReport { item, outcome }));
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        reports.sort_by_key(|(index, _)| *index);
        let summary = BatchSummary {
            reports: reports.into_iter().map(|(_, report)| report).collect(),
        };
        info!(
            op,
            total,
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "batch complete"
        );
        Ok(summary)
    }
}

/// The blob kind whose presence marks a complete envelope.
fn index_kind(layout: Layout) -> BlobKind {
    match layout {
        Layout::Split => BlobKind::WrappedKey,
        Layout::Bundle => BlobKind::Bundle,
    }
}

async fn run_blocking<T, F>(f: F) -> SealboxResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SealboxResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SealboxError::Other(anyhow::anyhow!("crypto task failed: {e}")))?
}

async fn seal_one<S, K>(
    store: Arc<S>,
    layout: Layout,
    io_timeout: Duration,
    input: SealInput,
    public: Arc<K>,
    remove_source: bool,
) -> SealboxResult<BlobId>
where
    S: BlobStore,
    K: WrappingKey + Send + Sync + 'static,
{
    let SealInput { name, source } = input;
    let (plaintext, source_path): (_, Option<PathBuf>) = match source {
        InputSource::File(path) => {
            let data = timed(
                io_timeout,
                format!("reading {}", path.display()),
                tokio::fs::read(&path),
            )
            .await?;
            (Zeroizing::new(data), Some(path))
        }
        InputSource::Bytes(data) => (Zeroizing::new(data), None),
    };

    let sealed = run_blocking(move || encrypt_item(&name, &plaintext, public.as_ref())).await?;
    let id = fresh_id(store.as_ref(), layout).await?;
    persist(store.as_ref(), layout, &id, sealed).await?;

    if let (true, Some(path)) = (remove_source, source_path) {
        // The envelope is stored; a leftover source is only clutter.
        if let Err(e) = timed(
            io_timeout,
            format!("removing {}", path.display()),
            tokio::fs::remove_file(&path),
        )
        .await
        {
            warn!(%id, "sealed but could not remove source: {e}");
        }
    }
    Ok(id)
}

async fn fresh_id<S: BlobStore>(store: &S, layout: Layout) -> SealboxResult<BlobId> {
    for _ in 0..ID_ATTEMPTS {
        let id = BlobId::generate()?;
        let taken = match layout {
            Layout::Bundle => store.contains(&id, BlobKind::Bundle).await?,
            Layout::Split => {
                store.contains(&id, BlobKind::WrappedKey).await?
                    || store.contains(&id, BlobKind::Ciphertext).await?
            }
        };
        if !taken {
            return Ok(id);
        }
        debug!(%id, "blob id already in use, drawing another");
    }
    Err(SealboxError::Other(anyhow::anyhow!(
        "no unused blob id after {ID_ATTEMPTS} attempts"
    )))
}

async fn persist<S: BlobStore>(
    store: &S,
    layout: Layout,
    id: &BlobId,
    sealed: SealedEnvelope,
) -> SealboxResult<()> {
    match layout {
        Layout::Bundle => store.put(id, BlobKind::Bundle, &sealed.to_bundle()?).await,
        Layout::Split => {
            let (ciphertext, wrapped_key) = sealed.into_parts();
            // Ciphertext first: a listed wrapped key always has its data.
            store.put(id, BlobKind::Ciphertext, &ciphertext).await?;
            if let Err(e) = store.put(id, BlobKind::WrappedKey, &wrapped_key).await {
                if let Err(cleanup) = store.remove(id, BlobKind::Ciphertext).await {
                    warn!(%id, "failed to remove orphaned ciphertext: {cleanup}");
                }
                return Err(e);
            }
            Ok(())
        }
    }
}

async fn load<S: BlobStore>(store: &S, layout: Layout, id: &BlobId) -> SealboxResult<SealedEnvelope> {
    match layout {
        Layout::Bundle => SealedEnvelope::from_bundle(&store.get(id, BlobKind::Bundle).await?),
        Layout::Split => {
            let wrapped_key = store.get(id, BlobKind::WrappedKey).await?;
            let ciphertext = store.get(id, BlobKind::Ciphertext).await?;
            Ok(SealedEnvelope::new(ciphertext, wrapped_key))
        }
    }
}

async fn open_one<S, K>(
    store: &S,
    layout: Layout,
    id: &BlobId,
    private: Arc<K>,
) -> SealboxResult<RestoredItem>
where
    S: BlobStore,
    K: UnwrappingKey + Send + Sync + 'static,
{
    let sealed = load(store, layout, id).await?;
    run_blocking(move || decrypt_item(sealed.wrapped_key(), sealed.ciphertext(), private.as_ref()))
        .await
}

async fn restore_one<S, K, R>(
    store: Arc<S>,
    layout: Layout,
    id: BlobId,
    private: Arc<K>,
    sink: Arc<R>,
    remove_envelope: bool,
) -> SealboxResult<Outcome>
where
    S: BlobStore,
    K: UnwrappingKey + Send + Sync + 'static,
    R: RestoreSink,
{
    let RestoredItem { name, plaintext } = open_one(store.as_ref(), layout, &id, private).await?;
    let plaintext = Zeroizing::new(plaintext);
    let location = sink.restore(&name, &plaintext).await?;

    if remove_envelope {
        // The item is safe at `location`; a leftover envelope is only clutter.
        if let Err(e) = discard(store.as_ref(), layout, &id).await {
            warn!(%id, "restored but could not remove envelope: {e}");
        }
    }
    Ok(Outcome::Restored { name, location })
}

async fn discard<S: BlobStore>(store: &S, layout: Layout, id: &BlobId) -> SealboxResult<()> {
    match layout {
        Layout::Bundle => store.remove(id, BlobKind::Bundle).await,
        Layout::Split => {
            // Key first, so a half-removed envelope is never listed as pending.
            store.remove(id, BlobKind::WrappedKey).await?;
            store.remove(id, BlobKind::Ciphertext).await
        }
    }
}
