//! Retry engine variant for API calls.

use crate::config::RetryConfig;
use crate::engine::{Operation, RetryEngine};
use std::ops::Deref;

/// [`RetryEngine`] that never automatically retries permanent failures.
///
/// Validation, permission, not-found and business-logic failures are filtered
/// out beneath whatever predicate the config carries, so even a predicate that
/// allows everything cannot cause them to be retried.
#[derive(Debug)]
pub struct ApiRetryEngine<O: Operation> {
    engine: RetryEngine<O>,
}

impl<O: Operation> ApiRetryEngine<O> {
    /// Create with [`RetryConfig::for_api`].
    pub fn new(operation: O) -> Self {
        Self::with_config(operation, RetryConfig::for_api())
    }

    /// Create with a custom config; the baseline filter is added to it.
    pub fn with_config(operation: O, config: RetryConfig) -> Self {
        RetryEngine::builder(operation).config(config).build_api()
    }

    pub(crate) fn from_engine(engine: RetryEngine<O>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &RetryEngine<O> {
        &self.engine
    }
}

impl<O: Operation> Deref for ApiRetryEngine<O> {
    type Target = RetryEngine<O>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}
