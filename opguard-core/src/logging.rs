//! Logging sink for classified failures.

use crate::classified::ClassifiedError;
use tracing::{error, warn};

/// Record a classified failure with the context it happened in.
///
/// Retryable kinds are logged at `WARN` since they are usually recovered;
/// everything else is logged at `ERROR`.
pub fn log_error(err: &ClassifiedError, context: &str) {
    if err.is_retryable() {
        warn!(
            context,
            kind = %err.kind(),
            code = err.code(),
            occurred_at = %err.occurred_at(),
            message = err.message(),
            "Operation failed"
        );
    } else {
        error!(
            context,
            kind = %err.kind(),
            code = err.code(),
            occurred_at = %err.occurred_at(),
            message = err.message(),
            "Operation failed"
        );
    }
}
