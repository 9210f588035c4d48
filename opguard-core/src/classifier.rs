//! Mapping arbitrary failures onto [`ErrorKind`]s.

use crate::classified::ClassifiedError;
use crate::errors::{kind_for_status, OperationError};
use crate::kind::ErrorKind;
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

/// Turns a raw failure into a [`ClassifiedError`].
///
/// Implementations must be deterministic for a given failure shape and must
/// not fail: anything they do not recognize becomes [`ErrorKind::Unknown`].
pub trait ErrorClassifier: Send + Sync {
    /// Classify a failure, taking ownership of it as the cause.
    fn classify(&self, raw: anyhow::Error) -> ClassifiedError;
}

impl<F> ErrorClassifier for F
where
    F: Fn(anyhow::Error) -> ClassifiedError + Send + Sync,
{
    fn classify(&self, raw: anyhow::Error) -> ClassifiedError {
        self(raw)
    }
}

/// Classifier that understands the error types commonly seen around network
/// calls.
///
/// The error chain is walked outermost first and the first recognized link
/// decides the kind:
///
/// - [`OperationError`] (except `Other`, which is looked through)
/// - `reqwest::Error`
/// - `tokio::time::error::Elapsed`
/// - `std::io::Error`
/// - `serde_json::Error` (treated as a validation failure)
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl DefaultClassifier {
    /// Create a new default classifier.
    pub fn new() -> Self {
        Self
    }
}

struct Recognized {
    kind: ErrorKind,
    code: Option<String>,
    retry_after: Option<Duration>,
}

impl Recognized {
    fn kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: None,
            retry_after: None,
        }
    }
}

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, raw: anyhow::Error) -> ClassifiedError {
        let recognized = raw
            .chain()
            .find_map(recognize)
            .unwrap_or_else(|| Recognized::kind(ErrorKind::Unknown));

        let mut classified = ClassifiedError::new(recognized.kind, format!("{raw:#}"))
            .with_retry_after(recognized.retry_after);
        if let Some(code) = recognized.code {
            classified = classified.with_code(code);
        }
        classified.with_cause(raw)
    }
}

fn recognize(err: &(dyn StdError + 'static)) -> Option<Recognized> {
    if let Some(op) = err.downcast_ref::<OperationError>() {
        return recognize_operation(op);
    }
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        return recognize_reqwest(http);
    }
    if err.is::<tokio::time::error::Elapsed>() {
        return Some(Recognized::kind(ErrorKind::Timeout));
    }
    if let Some(io) = err.downcast_ref::<io::Error>() {
        return recognize_io(io);
    }
    if err.is::<serde_json::Error>() {
        return Some(Recognized::kind(ErrorKind::Validation));
    }
    None
}

fn recognize_operation(err: &OperationError) -> Option<Recognized> {
    let kind = err.kind()?;
    let code = match err {
        OperationError::Http { status, .. } => Some(format!("HTTP_{status}")),
        OperationError::Business { code, .. } => Some(code.clone()),
        _ => None,
    };
    Some(Recognized {
        kind,
        code,
        retry_after: err.retry_after(),
    })
}

fn recognize_reqwest(err: &reqwest::Error) -> Option<Recognized> {
    if err.is_timeout() {
        return Some(Recognized::kind(ErrorKind::Timeout));
    }
    if let Some(status) = err.status() {
        let status = status.as_u16();
        return Some(Recognized {
            kind: kind_for_status(status),
            code: Some(format!("HTTP_{status}")),
            retry_after: None,
        });
    }
    if err.is_connect() || err.is_request() || err.is_body() {
        return Some(Recognized::kind(ErrorKind::Network));
    }
    None
}

fn recognize_io(err: &io::Error) -> Option<Recognized> {
    let kind = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ErrorKind::Network,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Validation,
        _ => return None,
    };
    Some(Recognized::kind(kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use rstest::rstest;

    fn classify(err: impl Into<anyhow::Error>) -> ClassifiedError {
        DefaultClassifier::new().classify(err.into())
    }

    #[rstest]
    #[case(OperationError::http(503, "unavailable"), ErrorKind::ServerError, "HTTP_503")]
    #[case(OperationError::http(404, ""), ErrorKind::NotFound, "HTTP_404")]
    #[case(OperationError::rate_limited(None), ErrorKind::RateLimit, "RATE_LIMIT")]
    #[case(OperationError::Timeout, ErrorKind::Timeout, "TIMEOUT")]
    #[case(OperationError::network("reset"), ErrorKind::Network, "NETWORK_ERROR")]
    #[case(OperationError::validation("bad email"), ErrorKind::Validation, "VALIDATION_ERROR")]
    #[case(OperationError::permission("nope"), ErrorKind::Permission, "PERMISSION_DENIED")]
    #[case(OperationError::business("QUOTA", "quota used"), ErrorKind::BusinessLogic, "QUOTA")]
    fn test_operation_errors(
        #[case] err: OperationError,
        #[case] kind: ErrorKind,
        #[case] code: &str,
    ) {
        let classified = classify(err);
        assert_eq!(classified.kind(), kind);
        assert_eq!(classified.code(), code);
    }

    #[rstest]
    #[case(io::ErrorKind::TimedOut, ErrorKind::Timeout)]
    #[case(io::ErrorKind::ConnectionRefused, ErrorKind::Network)]
    #[case(io::ErrorKind::ConnectionReset, ErrorKind::Network)]
    #[case(io::ErrorKind::PermissionDenied, ErrorKind::Permission)]
    #[case(io::ErrorKind::NotFound, ErrorKind::NotFound)]
    #[case(io::ErrorKind::InvalidData, ErrorKind::Validation)]
    #[case(io::ErrorKind::Other, ErrorKind::Unknown)]
    fn test_io_errors(#[case] io_kind: io::ErrorKind, #[case] kind: ErrorKind) {
        let classified = classify(io::Error::new(io_kind, "io failure"));
        assert_eq!(classified.kind(), kind);
    }

    #[tokio::test]
    async fn test_elapsed_is_timeout() {
        let elapsed = tokio::time::timeout(
            Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert_eq!(classify(elapsed).kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_json_error_is_validation() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        assert_eq!(classify(err).kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_unrecognized_is_unknown() {
        let classified = classify(anyhow::anyhow!("something odd"));
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert_eq!(classified.code(), "UNKNOWN_ERROR");
        assert_eq!(classified.message(), "something odd");
        assert!(!classified.is_retryable());
    }

    #[test]
    fn test_context_is_looked_through() {
        let err: anyhow::Result<()> = Err(io::Error::new(io::ErrorKind::TimedOut, "slow"))
            .context("loading profile");
        let classified = classify(err.unwrap_err());

        assert_eq!(classified.kind(), ErrorKind::Timeout);
        assert_eq!(classified.message(), "loading profile: slow");
    }

    #[test]
    fn test_other_wrapper_is_looked_through() {
        let inner = anyhow::Error::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let classified = classify(OperationError::Other(inner));
        assert_eq!(classified.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_retry_after_is_carried() {
        let classified = classify(OperationError::rate_limited(Some(Duration::from_secs(7))));
        assert_eq!(classified.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_cause_is_original() {
        let classified = classify(OperationError::not_found("user 7"));
        let cause = classified.cause().unwrap();
        assert!(cause.downcast_ref::<OperationError>().is_some());
    }

    #[test]
    fn test_deterministic() {
        let a = classify(OperationError::http(500, "x"));
        let b = classify(OperationError::http(500, "x"));
        assert_eq!(a.kind(), b.kind());
        assert_eq!(a.code(), b.code());
        assert_eq!(a.message(), b.message());
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |raw: anyhow::Error| {
            ClassifiedError::new(ErrorKind::BusinessLogic, raw.to_string())
        };
        let classified = classifier.classify(anyhow::anyhow!("custom"));
        assert_eq!(classified.kind(), ErrorKind::BusinessLogic);
    }
}
