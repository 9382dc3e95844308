//! Micro-batching primitive for keyed lookups.
//!
//! A [`Batcher`] collects keys requested during one coalescing window and
//! hands them to a [`BatchFetcher`] as a single bulk fetch. Every caller that
//! registered a key during the window is resolved from the one shared result,
//! positionally aligned to the de-duplicated key list.
//!
//! The coalescing window is cooperative: all `load`/`load_many` calls issued
//! before the driver task has been given a chance to run (a configurable
//! number of scheduler yields) land in the same batch. Calls arriving after a
//! batch has dispatched open a new window.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Errors surfaced by a batch load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError<E> {
    /// The underlying bulk fetch failed; every key pending in the batch
    /// receives a clone of the same error.
    #[error("batch fetch failed")]
    Fetch(E),

    /// The fetcher violated the positional-alignment contract.
    #[error("batch fetcher returned {actual} results for {expected} keys")]
    ResultLength { expected: usize, actual: usize },

    /// The driver task was torn down before delivering a result.
    #[error("batch was dropped before completing")]
    Dropped,
}

impl<E> BatchError<E> {
    /// Unwrap the fetcher error, if that is what this is.
    pub fn into_fetch_error(self) -> Option<E> {
        match self {
            BatchError::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

/// Bulk fetch capability driven by a [`Batcher`].
///
/// `fetch` receives the de-duplicated keys registered during one window and
/// must return one value per key, in the same order.
#[async_trait]
pub trait BatchFetcher: Send + Sync + 'static {
    type Key: Clone + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;
    type Error: Clone + Send + Sync + 'static;

    /// Canonical string identity of a key, used to de-duplicate keys that are
    /// registered more than once within a window.
    fn cache_key(&self, key: &Self::Key) -> String;

    async fn fetch(&self, keys: &[Self::Key]) -> Result<Vec<Self::Value>, Self::Error>;
}

/// Tuning for the coalescing window.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// How many times the driver task yields back to the scheduler before
    /// dispatching the pending batch. Larger values widen the window.
    pub yield_count: usize,
    /// Dispatch immediately once this many distinct keys are pending.
    pub max_batch_size: Option<usize>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            yield_count: 10,
            max_batch_size: None,
        }
    }
}

type BatchResult<F> = Result<
    Arc<Vec<<F as BatchFetcher>::Value>>,
    BatchError<<F as BatchFetcher>::Error>,
>;

type SharedBatch<F> = Shared<BoxFuture<'static, BatchResult<F>>>;

struct PendingBatch<F: BatchFetcher> {
    generation: u64,
    keys: Vec<F::Key>,
    index: HashMap<String, usize>,
    tx: oneshot::Sender<BatchResult<F>>,
    shared: SharedBatch<F>,
}

/// Coalesces concurrent keyed lookups into bulk fetches.
///
/// At most one batch is pending at a time; a generation counter guards the
/// driver task against re-dispatching a batch that was already flushed by the
/// size limit.
pub struct Batcher<F: BatchFetcher> {
    fetcher: Arc<F>,
    options: BatchOptions,
    generation: AtomicU64,
    pending: Arc<Mutex<Option<PendingBatch<F>>>>,
}

impl<F: BatchFetcher> Batcher<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_options(fetcher, BatchOptions::default())
    }

    pub fn with_options(fetcher: F, options: BatchOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            options,
            generation: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Load a single key through the current coalescing window.
    pub async fn load(&self, key: F::Key) -> Result<F::Value, BatchError<F::Error>> {
        let (index, shared) = self.enqueue(key);
        let values = shared.await?;
        values.get(index).cloned().ok_or(BatchError::ResultLength {
            expected: index + 1,
            actual: values.len(),
        })
    }

    /// Load several keys. All keys are registered before the first await, so
    /// they share a window with each other and with any other load issued in
    /// the same scheduling turn.
    pub async fn load_many(
        &self,
        keys: Vec<F::Key>,
    ) -> Result<Vec<F::Value>, BatchError<F::Error>> {
        let entries: Vec<_> = keys.into_iter().map(|key| self.enqueue(key)).collect();
        let mut results = Vec::with_capacity(entries.len());
        for (index, shared) in entries {
            let values = shared.await?;
            let value = values.get(index).cloned().ok_or(BatchError::ResultLength {
                expected: index + 1,
                actual: values.len(),
            })?;
            results.push(value);
        }
        Ok(results)
    }

    /// Register a key against the pending batch, opening a new window if none
    /// is pending. Returns the key's position and the shared batch result.
    fn enqueue(&self, key: F::Key) -> (usize, SharedBatch<F>) {
        let mut slot = self.pending.lock();

        if slot.is_none() {
            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            let shared = async move {
                match rx.await {
                    Ok(result) => result,
                    Err(_) => Err(BatchError::Dropped),
                }
            }
            .boxed()
            .shared();

            *slot = Some(PendingBatch {
                generation,
                keys: Vec::new(),
                index: HashMap::new(),
                tx,
                shared,
            });

            let pending = Arc::clone(&self.pending);
            let fetcher = Arc::clone(&self.fetcher);
            let yields = self.options.yield_count;
            tokio::spawn(async move {
                for _ in 0..yields {
                    tokio::task::yield_now().await;
                }
                let batch = {
                    let mut slot = pending.lock();
                    // A mismatched generation means the size limit already
                    // flushed this batch.
                    let ours = matches!(slot.as_ref(), Some(batch) if batch.generation == generation);
                    if ours {
                        slot.take()
                    } else {
                        None
                    }
                };
                if let Some(batch) = batch {
                    dispatch(fetcher, batch).await;
                }
            });
        }

        let batch = slot.as_mut().expect("pending batch was just installed");
        let id = self.fetcher.cache_key(&key);
        let index = match batch.index.get(&id) {
            Some(&index) => index,
            None => {
                let index = batch.keys.len();
                batch.keys.push(key);
                batch.index.insert(id, index);
                index
            }
        };
        let shared = batch.shared.clone();

        if let Some(max) = self.options.max_batch_size {
            if batch.keys.len() >= max {
                let batch = slot.take().expect("pending batch is present");
                let fetcher = Arc::clone(&self.fetcher);
                tokio::spawn(async move {
                    dispatch(fetcher, batch).await;
                });
            }
        }

        (index, shared)
    }
}

async fn dispatch<F: BatchFetcher>(fetcher: Arc<F>, batch: PendingBatch<F>) {
    debug!(keys = batch.keys.len(), "dispatching batch");
    let result = match fetcher.fetch(&batch.keys).await {
        Ok(values) if values.len() != batch.keys.len() => Err(BatchError::ResultLength {
            expected: batch.keys.len(),
            actual: values.len(),
        }),
        Ok(values) => Ok(Arc::new(values)),
        Err(err) => Err(BatchError::Fetch(err)),
    };
    // Receivers may all have been dropped; nothing to do then.
    let _ = batch.tx.send(result);
}
