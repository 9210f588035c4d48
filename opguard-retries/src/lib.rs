//! # opguard-retries
//!
//! Retry engines for asynchronous operations.
//!
//! ## Core Concepts
//!
//! - **[`RetryConfig`]**: Immutable retry settings and predicate
//! - **[`backoff`]**: Exponential delay with up to 10% jitter
//! - **[`RetryEngine`]**: Stateful engine for a single operation with
//!   automatic and manual retries, supersession and reset
//! - **[`ApiRetryEngine`]**: Engine variant that never retries permanent
//!   failures
//! - **[`BatchRetryEngine`]**: Sequential chunked execution with per-chunk
//!   retries and progress accounting
//! - **[`Scheduler`]**: Timer collaborator that runs delayed retries
//!
//! ## Example
//!
//! ```ignore
//! use opguard_retries::{BatchConfig, BatchRetryEngine};
//!
//! let engine = BatchRetryEngine::new(
//!     |rows: Vec<Row>| async move { upload(rows).await },
//!     BatchConfig::new().batch_size(50),
//! );
//!
//! let receipts = engine.execute(rows).await?;
//! println!("{:?}", engine.progress());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod api;
pub mod backoff;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod state;

// Re-exports
pub use api::ApiRetryEngine;
pub use batch::{BatchProgress, BatchRetryEngine, ChunkFailure, ChunkOperation};
pub use config::{BackoffSettings, BatchConfig, BatchSettings, RetryConfig, RetryPredicate};
pub use engine::{ExecutionToken, Operation, RetryEngine, RetryEngineBuilder};
pub use error::{BatchError, ConfigError};
pub use scheduler::{ScheduleHandle, Scheduler, TokioScheduler};
pub use state::{OperationState, OperationStatus};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ApiRetryEngine, BatchConfig, BatchProgress, BatchRetryEngine, OperationState,
        OperationStatus, RetryConfig, RetryEngine, RetryPredicate,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let config = RetryConfig::new().max_retries(5);
        assert_eq!(config.max_retries, 5);
        assert_eq!(BatchConfig::new().batch_size, 10);
    }

    #[test]
    fn test_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.validate().is_ok());
    }
}
