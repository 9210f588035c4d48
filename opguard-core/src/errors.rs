//! Typed failures that operations can return.
//!
//! Operations may fail with any error at all; [`OperationError`] is the
//! vocabulary for callers who want to state the failure category explicitly
//! instead of relying on the classifier's inference.

use crate::kind::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// A failure with an explicit category.
#[derive(Debug, Error)]
pub enum OperationError {
    /// HTTP error with status code.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
        /// Retry-After header value.
        retry_after: Option<Duration>,
    },

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited {
        /// Suggested retry time.
        retry_after: Option<Duration>,
    },

    /// Timeout.
    #[error("Timeout")]
    Timeout,

    /// Connection or transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Input rejected.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller is not allowed to do this.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Target does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Domain rule violation.
    #[error("{message}")]
    Business {
        /// Domain-specific error code.
        code: String,
        /// Description of the violation.
        message: String,
    },

    /// Other error.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl OperationError {
    /// Create an HTTP error.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::RateLimited { retry_after }
    }

    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a permission error.
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a business rule error.
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Get the suggested retry-after duration.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Get the HTTP status if this is an HTTP error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// The category this error states, if it states one.
    ///
    /// `Other` defers to whatever it wraps, so it returns `None`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Http { status, .. } => Some(kind_for_status(*status)),
            Self::RateLimited { .. } => Some(ErrorKind::RateLimit),
            Self::Timeout => Some(ErrorKind::Timeout),
            Self::Network(_) => Some(ErrorKind::Network),
            Self::Validation(_) => Some(ErrorKind::Validation),
            Self::Permission(_) => Some(ErrorKind::Permission),
            Self::NotFound(_) => Some(ErrorKind::NotFound),
            Self::Business { .. } => Some(ErrorKind::BusinessLogic),
            Self::Other(_) => None,
        }
    }
}

/// Map an HTTP status code onto an [`ErrorKind`].
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        408 => ErrorKind::Timeout,
        429 => ErrorKind::RateLimit,
        400 | 422 => ErrorKind::Validation,
        401 | 403 => ErrorKind::Permission,
        404 | 410 => ErrorKind::NotFound,
        409 | 412 => ErrorKind::BusinessLogic,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}
