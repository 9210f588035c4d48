//! Observable state of a single-operation engine.

use chrono::{DateTime, Utc};
use opguard_core::ClassifiedError;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Nothing has run since construction or the last reset.
    #[default]
    Idle,
    /// An attempt is in flight.
    Running,
    /// An automatic retry is scheduled.
    Retrying,
    /// The latest attempt succeeded.
    Succeeded,
    /// The latest attempt failed and nothing is scheduled.
    Failed,
}

/// Snapshot of an engine's state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationState {
    /// Current status.
    pub status: OperationStatus,
    /// Retries made in the current execution.
    pub attempt_count: u32,
    /// Error of the latest failed attempt.
    pub last_error: Option<ClassifiedError>,
    /// Whether `retry()` would run an attempt.
    pub can_retry: bool,
    /// When the latest attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl OperationState {
    /// Whether an attempt is running or scheduled.
    pub fn is_busy(&self) -> bool {
        matches!(self.status, OperationStatus::Running | OperationStatus::Retrying)
    }

    /// Whether the engine is at rest with nothing recorded.
    pub fn is_idle(&self) -> bool {
        self.status == OperationStatus::Idle
    }
}
