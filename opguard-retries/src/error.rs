//! Error types for the retry engines.

use opguard_core::ClassifiedError;
use std::time::Duration;
use thiserror::Error;

/// Invalid retry or batch configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Multiplier must grow the delay.
    #[error("backoff multiplier must be finite and greater than 1, got {0}")]
    InvalidMultiplier(f64),

    /// Cap below the starting delay.
    #[error("max delay {max:?} is shorter than initial delay {initial:?}")]
    DelayRange {
        /// Configured initial delay.
        initial: Duration,
        /// Configured cap.
        max: Duration,
    },

    /// Chunks must hold at least one item.
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

/// A batch that did not run to completion.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// A chunk exhausted its attempts and the batch was configured to abort.
    #[error("chunk {chunk_index} failed after {attempts} attempts: {error}")]
    ChunkFailed {
        /// Zero-based index of the failing chunk.
        chunk_index: usize,
        /// Attempts made on the chunk.
        attempts: u32,
        /// Classified error of the last attempt.
        #[source]
        error: ClassifiedError,
    },

    /// The batch was reset or superseded while running.
    #[error("batch was cancelled")]
    Cancelled,
}

impl BatchError {
    /// The classified error behind a chunk failure.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::ChunkFailed { error, .. } => Some(error),
            Self::Cancelled => None,
        }
    }
}
