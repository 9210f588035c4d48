//! # opguard
//!
//! Wraps asynchronous units of work, typically network calls, with failure
//! classification, exponential backoff with jitter, bounded retries,
//! cooperative cancellation, and chunked batch execution with partial-success
//! accounting.
//!
//! ## Quick Start
//!
//! ```ignore
//! use opguard::prelude::*;
//!
//! let engine = RetryEngine::new(|| async { client.load_settings().await }, RetryConfig::new());
//! let mut state = engine.subscribe();
//!
//! engine.execute().await;
//! let state = state.wait_for(|s| !s.is_busy()).await?;
//! if let Some(error) = &state.last_error {
//!     eprintln!("{}", error.user_message());
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `opguard-core` | `ErrorKind`, `ClassifiedError`, classifiers, logging sink |
//! | `opguard-retries` | Backoff, configs, scheduler, single and batch engines |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub use opguard_core::{
    log_error, ClassifiedError, DefaultClassifier, ErrorClassifier, ErrorKind, OperationError,
};
pub use opguard_retries::{
    backoff, ApiRetryEngine, BackoffSettings, BatchConfig, BatchError, BatchProgress,
    BatchRetryEngine, BatchSettings, ChunkFailure, ChunkOperation, ConfigError, ExecutionToken,
    Operation, OperationState, OperationStatus, RetryConfig, RetryEngine, RetryEngineBuilder,
    RetryPredicate, ScheduleHandle, Scheduler, TokioScheduler,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ApiRetryEngine, BatchConfig, BatchError, BatchProgress, BatchRetryEngine,
        ClassifiedError, ErrorKind, OperationError, OperationState, OperationStatus, RetryConfig,
        RetryEngine, RetryPredicate,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_through_facade() {
        let engine = ApiRetryEngine::with_config(
            || async { Err::<(), _>(OperationError::http(403, "forbidden")) },
            RetryConfig::new().initial_delay(Duration::from_millis(10)),
        );

        engine.execute().await;
        let state = engine.state();
        assert_eq!(state.status, OperationStatus::Failed);
        let error = state.last_error.unwrap();
        assert_eq!(error.kind(), ErrorKind::Permission);
        assert_eq!(error.code(), "HTTP_403");
    }

    #[tokio::test]
    async fn test_batch_through_facade() -> anyhow::Result<()> {
        let engine = BatchRetryEngine::new(
            |chunk: Vec<&'static str>| async move { Ok::<_, OperationError>(chunk.join(",")) },
            BatchConfig::new().batch_size(2),
        );

        let joined = engine.execute(vec!["a", "b", "c"]).await?;
        assert_eq!(joined, vec!["a,b".to_string(), "c".to_string()]);
        assert_eq!(
            engine.progress(),
            BatchProgress {
                completed: 3,
                total: 3,
                failed: 0
            }
        );
        Ok(())
    }
}
