//! Closed set of failure categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an operation failed.
///
/// The set is closed: every failure an engine sees is mapped onto exactly one
/// of these kinds before any retry decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Connection refused, reset, DNS failure and the like.
    Network,
    /// The call did not complete in time.
    Timeout,
    /// The remote side failed (5xx).
    ServerError,
    /// The remote side asked us to slow down.
    RateLimit,
    /// The request itself was rejected as invalid.
    Validation,
    /// Authentication or authorization failure.
    Permission,
    /// The target resource does not exist.
    NotFound,
    /// A domain rule rejected the operation.
    BusinessLogic,
    /// Anything not recognized.
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::ServerError,
        ErrorKind::RateLimit,
        ErrorKind::Validation,
        ErrorKind::Permission,
        ErrorKind::NotFound,
        ErrorKind::BusinessLogic,
        ErrorKind::Unknown,
    ];

    /// Whether failures of this kind are retried by default.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::ServerError
            | ErrorKind::RateLimit => true,
            ErrorKind::Validation
            | ErrorKind::Permission
            | ErrorKind::NotFound
            | ErrorKind::BusinessLogic
            | ErrorKind::Unknown => false,
        }
    }

    /// Whether retrying can never help, whatever a caller predicate says.
    ///
    /// `Unknown` is deliberately absent: it is not retried by default but a
    /// caller may opt in.
    pub fn is_permanent(self) -> bool {
        match self {
            ErrorKind::Validation
            | ErrorKind::Permission
            | ErrorKind::NotFound
            | ErrorKind::BusinessLogic => true,
            ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::ServerError
            | ErrorKind::RateLimit
            | ErrorKind::Unknown => false,
        }
    }

    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Permission => "PERMISSION_DENIED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::BusinessLogic => "BUSINESS_LOGIC_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Default message suitable for showing to an end user.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "Unable to reach the server. Please check your connection and try again."
            }
            ErrorKind::Timeout => "The request took too long to complete. Please try again.",
            ErrorKind::ServerError => "The server encountered an error. Please try again later.",
            ErrorKind::RateLimit => "Too many requests. Please wait a moment and try again.",
            ErrorKind::Validation => "Some of the submitted data is invalid.",
            ErrorKind::Permission => "You do not have permission to perform this action.",
            ErrorKind::NotFound => "The requested resource could not be found.",
            ErrorKind::BusinessLogic => "The operation could not be completed.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Permission => "PERMISSION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::BusinessLogic => "BUSINESS_LOGIC",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
