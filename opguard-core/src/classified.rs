//! The classified form of a failed attempt.

use crate::kind::ErrorKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A failure after classification.
///
/// Created once per failed attempt and never mutated afterwards. The original
/// failure is kept as an opaque `cause` behind an `Arc` so state snapshots
/// holding this value stay cheap to clone.
#[derive(Debug, Clone, Error, Serialize)]
pub struct ClassifiedError {
    kind: ErrorKind,
    code: String,
    message: String,
    user_message: String,
    occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<Duration>,
    #[serde(skip)]
    cause: Option<Arc<anyhow::Error>>,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.code, self.message)
    }
}

impl ClassifiedError {
    /// Create a classified error with the kind's default code and user message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            user_message: kind.user_message().to_string(),
            occurred_at: Utc::now(),
            retry_after: None,
            cause: None,
        }
    }

    /// Override the machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Override the user-facing message.
    #[must_use]
    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    /// Attach the original failure.
    #[must_use]
    pub fn with_cause(mut self, cause: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attach a server-suggested delay before the next attempt.
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Failure category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Machine-readable code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Technical description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Message suitable for an end user.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// When the failure was classified.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Server-suggested delay, if the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// The original failure.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    /// Whether the kind is retryable by default.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
