//! Single-operation retry engine.
//!
//! A [`RetryEngine`] wraps one asynchronous operation and owns its
//! [`OperationState`]. Failures are classified, and when the config allows it
//! an automatic retry is scheduled after a backoff delay. Automatic retries
//! chain until the predicate or `max_retries` stops them; a manual
//! [`RetryEngine::retry`] runs a single attempt and never schedules.
//!
//! Every `execute`, manual `retry` and `reset` invalidates the previous
//! [`ExecutionToken`]. Results and scheduled retries tied to a stale token are
//! dropped without touching state.
//!
//! ## Example
//!
//! ```ignore
//! use opguard_retries::{RetryConfig, RetryEngine};
//!
//! let engine = RetryEngine::new(|| async { fetch_profile().await }, RetryConfig::new());
//! let mut state = engine.subscribe();
//!
//! if engine.execute().await.is_none() {
//!     state.wait_for(|s| !s.is_busy()).await?;
//! }
//! ```

use crate::api::ApiRetryEngine;
use crate::backoff;
use crate::config::RetryConfig;
use crate::error::ConfigError;
use crate::scheduler::{ScheduleHandle, Scheduler, TokioScheduler};
use crate::state::{OperationState, OperationStatus};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use opguard_core::{log_error, DefaultClassifier, ErrorClassifier};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// A retryable unit of work.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Value produced on success.
    type Output: Clone + Send + Sync + 'static;

    /// Run the operation once.
    async fn call(&self) -> anyhow::Result<Self::Output>;
}

#[async_trait]
impl<F, Fut, T, E> Operation for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
    E: Into<anyhow::Error> + Send + 'static,
{
    type Output = T;

    async fn call(&self) -> anyhow::Result<T> {
        (self)().await.map_err(Into::into)
    }
}

/// Identity of one execution.
///
/// Issued by the engine for each `execute` or manual `retry`. Only the most
/// recently issued token is current; the engine checks a completing attempt's
/// token against it before touching state.
#[derive(Debug, Clone)]
pub struct ExecutionToken {
    generation: u64,
    cancel: CancellationToken,
}

impl ExecutionToken {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
        }
    }

    /// Monotonic id of the execution.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this execution has been superseded or reset.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until this execution is superseded or reset.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// The underlying cancellation token, for cooperative checks inside an
    /// operation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptMode {
    Initial,
    Scheduled,
    Manual,
}

impl AttemptMode {
    fn may_schedule(self) -> bool {
        match self {
            AttemptMode::Initial | AttemptMode::Scheduled => true,
            AttemptMode::Manual => false,
        }
    }
}

struct Inner<T> {
    state: OperationState,
    output: Option<T>,
    generation: u64,
    token: Option<ExecutionToken>,
    pending: Option<ScheduleHandle>,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            state: OperationState::default(),
            output: None,
            generation: 0,
            token: None,
            pending: None,
        }
    }

    fn invalidate(&mut self, scheduler: &dyn Scheduler) {
        if let Some(token) = self.token.take() {
            token.cancel.cancel();
        }
        if let Some(handle) = self.pending.take() {
            scheduler.cancel(handle);
        }
    }

    fn issue_token(&mut self) -> ExecutionToken {
        self.generation += 1;
        let token = ExecutionToken::new(self.generation);
        self.token = Some(token.clone());
        token
    }

    fn is_current(&self, token: &ExecutionToken) -> bool {
        !token.is_cancelled()
            && self
                .token
                .as_ref()
                .is_some_and(|current| current.generation == token.generation)
    }

    fn mark_running(&mut self) {
        self.state.status = OperationStatus::Running;
        self.state.can_retry = false;
        self.state.last_attempt_at = Some(Utc::now());
    }
}

struct Shared<O: Operation> {
    operation: O,
    config: RetryConfig,
    classifier: Arc<dyn ErrorClassifier>,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<Inner<O::Output>>,
    state_tx: watch::Sender<OperationState>,
}

impl<O: Operation> Shared<O> {
    fn publish(&self, inner: &Inner<O::Output>) {
        self.state_tx.send_replace(inner.state.clone());
    }

    fn begin_execute(&self) -> ExecutionToken {
        let mut inner = self.inner.lock();
        inner.invalidate(self.scheduler.as_ref());
        let token = inner.issue_token();
        inner.state.attempt_count = 0;
        inner.mark_running();
        self.publish(&inner);

        debug!(generation = token.generation, "Starting execution");
        token
    }

    fn begin_manual_retry(&self) -> Option<ExecutionToken> {
        let mut inner = self.inner.lock();
        if !inner.state.can_retry {
            trace!("Manual retry ignored, retry not allowed");
            return None;
        }
        inner.invalidate(self.scheduler.as_ref());
        let token = inner.issue_token();
        inner.state.attempt_count += 1;
        inner.mark_running();
        self.publish(&inner);

        debug!(
            generation = token.generation,
            attempt = inner.state.attempt_count,
            max_retries = self.config.max_retries,
            "Starting manual retry"
        );
        Some(token)
    }

    fn begin_scheduled_retry(&self, token: &ExecutionToken) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_current(token) {
            trace!(generation = token.generation, "Dropping stale scheduled retry");
            return false;
        }
        inner.pending = None;
        inner.state.attempt_count += 1;
        inner.mark_running();
        self.publish(&inner);

        debug!(
            generation = token.generation,
            attempt = inner.state.attempt_count,
            max_retries = self.config.max_retries,
            "Starting automatic retry"
        );
        true
    }

    fn run_attempt(
        self: Arc<Self>,
        token: ExecutionToken,
        mode: AttemptMode,
    ) -> BoxFuture<'static, Option<O::Output>> {
        async move {
            let result = self.operation.call().await;
            self.complete(token, mode, result)
        }
        .boxed()
    }

    fn complete(
        self: &Arc<Self>,
        token: ExecutionToken,
        mode: AttemptMode,
        result: anyhow::Result<O::Output>,
    ) -> Option<O::Output> {
        let mut inner = self.inner.lock();
        if !inner.is_current(&token) {
            trace!(generation = token.generation, "Discarding stale result");
            return None;
        }

        match result {
            Ok(output) => {
                inner.output = Some(output.clone());
                inner.state.status = OperationStatus::Succeeded;
                inner.state.attempt_count = 0;
                inner.state.last_error = None;
                inner.state.can_retry = false;
                self.publish(&inner);

                debug!(generation = token.generation, "Operation succeeded");
                Some(output)
            }
            Err(raw) => {
                let error = self.classifier.classify(raw);
                let retries = inner.state.attempt_count;
                let can_retry = self.config.allows_retry(&error, retries);
                log_error(&error, "retry engine");

                inner.state.status = OperationStatus::Failed;
                inner.state.last_error = Some(error.clone());
                inner.state.can_retry = can_retry;
                self.publish(&inner);

                if can_retry && mode.may_schedule() {
                    let delay = backoff::delay_for_error(retries, &self.config, &error);
                    debug!(
                        generation = token.generation,
                        attempt = retries + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        kind = %error.kind(),
                        "Scheduling automatic retry"
                    );
                    inner.pending = Some(self.schedule_retry(delay, token));
                    inner.state.status = OperationStatus::Retrying;
                    self.publish(&inner);
                }
                None
            }
        }
    }

    fn schedule_retry(self: &Arc<Self>, delay: Duration, token: ExecutionToken) -> ScheduleHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let task = async move {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if shared.begin_scheduled_retry(&token) {
                shared.run_attempt(token, AttemptMode::Scheduled).await;
            }
        }
        .boxed();
        self.scheduler.schedule(delay, task)
    }
}

/// Retry engine for a single operation.
pub struct RetryEngine<O: Operation> {
    shared: Arc<Shared<O>>,
}

impl<O: Operation> fmt::Debug for RetryEngine<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryEngine")
            .field("config", &self.shared.config)
            .field("state", &*self.shared.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl<O: Operation> RetryEngine<O> {
    /// Create an engine with the default classifier and a Tokio scheduler.
    ///
    /// The config is used as given; see [`try_new`](Self::try_new).
    pub fn new(operation: O, config: RetryConfig) -> Self {
        Self::builder(operation).config(config).build()
    }

    /// Like [`new`](Self::new), but rejects a config that fails
    /// [`RetryConfig::validate`].
    pub fn try_new(operation: O, config: RetryConfig) -> Result<Self, ConfigError> {
        Self::builder(operation).config(config).try_build()
    }

    /// Create a builder.
    pub fn builder(operation: O) -> RetryEngineBuilder<O> {
        RetryEngineBuilder::new(operation)
    }

    /// Run the operation, superseding any execution in flight.
    ///
    /// Returns the output if this attempt succeeded and is still current.
    /// Failures are reported through [`state`](Self::state), never as errors.
    pub async fn execute(&self) -> Option<O::Output> {
        let token = self.shared.begin_execute();
        Arc::clone(&self.shared)
            .run_attempt(token, AttemptMode::Initial)
            .await
    }

    /// Run one retry attempt now, if the last failure allows it.
    ///
    /// Cancels a pending automatic retry. Does not schedule further retries.
    pub async fn retry(&self) -> Option<O::Output> {
        let token = self.shared.begin_manual_retry()?;
        Arc::clone(&self.shared)
            .run_attempt(token, AttemptMode::Manual)
            .await
    }

    /// Cancel everything and return to `Idle`.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock();
        inner.invalidate(self.shared.scheduler.as_ref());
        inner.generation += 1;
        inner.output = None;
        inner.state = OperationState::default();
        self.shared.publish(&inner);
        debug!("Engine reset");
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> OperationState {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<OperationState> {
        self.shared.state_tx.subscribe()
    }

    /// Output of the latest successful attempt.
    pub fn output(&self) -> Option<O::Output> {
        self.shared.inner.lock().output.clone()
    }

    /// Token of the current execution, if one is live.
    pub fn current_token(&self) -> Option<ExecutionToken> {
        self.shared.inner.lock().token.clone()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.shared.config
    }
}

impl<O: Operation> Drop for RetryEngine<O> {
    fn drop(&mut self) {
        self.shared
            .inner
            .lock()
            .invalidate(self.shared.scheduler.as_ref());
    }
}

/// Builder for [`RetryEngine`].
pub struct RetryEngineBuilder<O> {
    operation: O,
    config: RetryConfig,
    classifier: Option<Arc<dyn ErrorClassifier>>,
    scheduler: Option<Arc<dyn Scheduler>>,
}

impl<O: Operation> RetryEngineBuilder<O> {
    /// Create a builder with default config.
    pub fn new(operation: O) -> Self {
        Self {
            operation,
            config: RetryConfig::default(),
            classifier: None,
            scheduler: None,
        }
    }

    /// Set the retry config.
    #[must_use]
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the error classifier.
    #[must_use]
    pub fn classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Set the scheduler used for automatic retries.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Build the engine after validating the config.
    pub fn try_build(self) -> Result<RetryEngine<O>, ConfigError> {
        self.config.validate()?;
        Ok(self.build())
    }

    /// Build the API variant after validating the config.
    pub fn try_build_api(self) -> Result<ApiRetryEngine<O>, ConfigError> {
        self.config.validate()?;
        Ok(self.build_api())
    }

    /// Build the engine without validating the config.
    pub fn build(self) -> RetryEngine<O> {
        let (state_tx, _) = watch::channel(OperationState::default());
        let shared = Shared {
            operation: self.operation,
            config: self.config,
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(DefaultClassifier::new())),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TokioScheduler::new())),
            inner: Mutex::new(Inner::new()),
            state_tx,
        };
        RetryEngine {
            shared: Arc::new(shared),
        }
    }

    /// Build the API variant, which never retries permanent failures.
    pub fn build_api(mut self) -> ApiRetryEngine<O> {
        self.config = self.config.with_baseline();
        ApiRetryEngine::from_engine(self.build())
    }
}
