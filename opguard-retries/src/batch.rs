//! Chunked batch execution with per-chunk retries.
//!
//! Items are split into contiguous chunks of `batch_size` and processed
//! strictly in order. Each chunk gets up to `max_retries_per_chunk` attempts
//! with a fixed delay in between. A chunk that runs out of attempts is counted
//! as failed; the batch then either moves on (`retry_failed_only`) or aborts
//! with the chunk's classified error.

use crate::config::BatchConfig;
use crate::error::{BatchError, ConfigError};
use async_trait::async_trait;
use opguard_core::{log_error, ClassifiedError, DefaultClassifier, ErrorClassifier};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Operation applied to one chunk of a batch.
#[async_trait]
pub trait ChunkOperation<T>: Send + Sync {
    /// Value produced for a successful chunk.
    type Output: Send;

    /// Process one chunk.
    async fn run(&self, chunk: Vec<T>) -> anyhow::Result<Self::Output>;
}

#[async_trait]
impl<F, Fut, T, R, E> ChunkOperation<T> for F
where
    F: Fn(Vec<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    type Output = R;

    async fn run(&self, chunk: Vec<T>) -> anyhow::Result<R> {
        (self)(chunk).await.map_err(Into::into)
    }
}

/// Progress of a batch.
///
/// `completed + failed <= total` at all times, with equality once every chunk
/// has been processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    /// Items in chunks that succeeded.
    pub completed: usize,
    /// Total items in the batch.
    pub total: usize,
    /// Items in chunks that exhausted their attempts.
    pub failed: usize,
}

impl BatchProgress {
    fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            failed: 0,
        }
    }

    /// Items not yet processed.
    pub fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }

    /// Whether every item has been processed.
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Record of a chunk that exhausted its attempts.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    /// Zero-based chunk index.
    pub chunk_index: usize,
    /// Number of items in the chunk.
    pub items: usize,
    /// Attempts made.
    pub attempts: u32,
    /// Error of the last attempt.
    pub error: ClassifiedError,
}

enum ChunkError {
    Exhausted { attempts: u32, error: ClassifiedError },
    Cancelled,
}

/// Batch executor with per-chunk retries.
pub struct BatchRetryEngine<T, C> {
    operation: C,
    config: BatchConfig,
    classifier: Arc<dyn ErrorClassifier>,
    progress_tx: watch::Sender<BatchProgress>,
    failures: Mutex<Vec<ChunkFailure>>,
    cancel: Mutex<CancellationToken>,
    _items: PhantomData<fn(Vec<T>)>,
}

impl<T, C> fmt::Debug for BatchRetryEngine<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRetryEngine")
            .field("config", &self.config)
            .field("progress", &*self.progress_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl<T, C> BatchRetryEngine<T, C>
where
    T: Clone + Send + 'static,
    C: ChunkOperation<T>,
{
    /// Create a batch engine with the default classifier.
    pub fn new(operation: C, config: BatchConfig) -> Self {
        let (progress_tx, _) = watch::channel(BatchProgress::default());
        Self {
            operation,
            config,
            classifier: Arc::new(DefaultClassifier::new()),
            progress_tx,
            failures: Mutex::new(Vec::new()),
            cancel: Mutex::new(CancellationToken::new()),
            _items: PhantomData,
        }
    }

    /// Like [`new`](Self::new), but rejects a config that fails
    /// [`BatchConfig::validate`].
    pub fn try_new(operation: C, config: BatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(operation, config))
    }

    /// Replace the error classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Process `items` chunk by chunk.
    ///
    /// Returns one output per successful chunk, in chunk order. Starting a new
    /// batch cancels one that is still running on this engine.
    pub async fn execute(&self, items: Vec<T>) -> Result<Vec<C::Output>, BatchError> {
        let token = {
            let mut current = self.cancel.lock();
            current.cancel();
            *current = CancellationToken::new();
            self.failures.lock().clear();
            current.clone()
        };

        let batch_size = self.config.effective_batch_size();
        let mut progress = BatchProgress::new(items.len());
        self.publish(&token, progress, None);

        debug!(
            total = progress.total,
            batch_size,
            chunks = progress.total.div_ceil(batch_size),
            "Starting batch"
        );

        let mut outputs = Vec::new();
        let mut remaining = items.into_iter();
        for chunk_index in 0.. {
            let chunk: Vec<T> = remaining.by_ref().take(batch_size).collect();
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();

            match self.run_chunk(chunk_index, chunk, &token).await {
                Ok(output) => {
                    outputs.push(output);
                    progress.completed += len;
                    self.publish(&token, progress, None);
                }
                Err(ChunkError::Cancelled) => {
                    debug!(chunk = chunk_index, "Batch cancelled");
                    return Err(BatchError::Cancelled);
                }
                Err(ChunkError::Exhausted { attempts, error }) => {
                    progress.failed += len;
                    let failure = ChunkFailure {
                        chunk_index,
                        items: len,
                        attempts,
                        error: error.clone(),
                    };
                    self.publish(&token, progress, Some(failure));

                    if !self.config.retry_failed_only {
                        warn!(chunk = chunk_index, attempts, "Aborting batch");
                        return Err(BatchError::ChunkFailed {
                            chunk_index,
                            attempts,
                            error,
                        });
                    }
                }
            }
        }

        debug!(
            completed = progress.completed,
            failed = progress.failed,
            total = progress.total,
            "Batch finished"
        );
        Ok(outputs)
    }

    async fn run_chunk(
        &self,
        chunk_index: usize,
        chunk: Vec<T>,
        token: &CancellationToken,
    ) -> Result<C::Output, ChunkError> {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;

        loop {
            if token.is_cancelled() {
                return Err(ChunkError::Cancelled);
            }
            attempt += 1;

            let result = self.operation.run(chunk.clone()).await;
            if token.is_cancelled() {
                return Err(ChunkError::Cancelled);
            }

            let error = match result {
                Ok(output) => return Ok(output),
                Err(raw) => self.classifier.classify(raw),
            };

            if attempt >= max_attempts {
                log_error(&error, "batch chunk");
                return Err(ChunkError::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            debug!(
                chunk = chunk_index,
                attempt,
                max_attempts,
                delay_ms = self.config.retry_delay.as_millis() as u64,
                kind = %error.kind(),
                "Retrying chunk"
            );

            tokio::select! {
                _ = token.cancelled() => return Err(ChunkError::Cancelled),
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }

    /// Cancel a running batch and clear progress and failures.
    pub fn reset(&self) {
        let mut current = self.cancel.lock();
        current.cancel();
        *current = CancellationToken::new();
        self.failures.lock().clear();
        self.progress_tx.send_replace(BatchProgress::default());
        debug!("Batch engine reset");
    }

    /// Current progress.
    pub fn progress(&self) -> BatchProgress {
        *self.progress_tx.borrow()
    }

    /// Receiver that observes every progress update.
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress_tx.subscribe()
    }

    /// Chunks of the latest batch that exhausted their attempts.
    pub fn failures(&self) -> Vec<ChunkFailure> {
        self.failures.lock().clone()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    // Runs under the `cancel` lock so a concurrent reset cannot interleave
    // between the token check and the writes.
    fn publish(
        &self,
        token: &CancellationToken,
        progress: BatchProgress,
        failure: Option<ChunkFailure>,
    ) {
        let _current = self.cancel.lock();
        if token.is_cancelled() {
            return;
        }
        if let Some(failure) = failure {
            self.failures.lock().push(failure);
        }
        self.progress_tx.send_replace(progress);
    }
}
