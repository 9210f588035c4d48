//! # opguard-core
//!
//! Error classification primitives shared by the opguard engines.
//!
//! Every failure an engine observes goes through an [`ErrorClassifier`]
//! first, which maps it onto one of the nine [`ErrorKind`]s. Retry decisions
//! are made on the resulting [`ClassifiedError`], never on the raw failure.
//!
//! ## Example
//!
//! ```
//! use opguard_core::{DefaultClassifier, ErrorClassifier, ErrorKind, OperationError};
//!
//! let classified = DefaultClassifier::new().classify(OperationError::http(503, "busy").into());
//! assert_eq!(classified.kind(), ErrorKind::ServerError);
//! assert!(classified.is_retryable());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod classified;
pub mod classifier;
pub mod errors;
pub mod kind;
pub mod logging;

pub use classified::ClassifiedError;
pub use classifier::{DefaultClassifier, ErrorClassifier};
pub use errors::{kind_for_status, OperationError};
pub use kind::ErrorKind;
pub use logging::log_error;
