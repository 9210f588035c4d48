//! Retry and batch configuration.

use crate::error::ConfigError;
use opguard_core::ClassifiedError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a classified failure may be retried.
///
/// The second argument is the number of retries already made in the current
/// execution (zero after the first failure).
#[derive(Clone)]
pub struct RetryPredicate(Arc<dyn Fn(&ClassifiedError, u32) -> bool + Send + Sync>);

impl fmt::Debug for RetryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryPredicate(..)")
    }
}

impl Default for RetryPredicate {
    fn default() -> Self {
        Self::retryable_kinds()
    }
}

impl RetryPredicate {
    /// Wrap a custom predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ClassifiedError, u32) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Retry exactly the kinds that are retryable by default.
    pub fn retryable_kinds() -> Self {
        Self::new(|error, _| error.kind().is_retryable())
    }

    /// Retry everything.
    pub fn always() -> Self {
        Self::new(|_, _| true)
    }

    /// Retry nothing.
    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    /// Put the permanent-kind filter underneath this predicate.
    ///
    /// The result never allows a retry of a validation, permission,
    /// not-found or business-logic failure, whatever `self` returns.
    #[must_use]
    pub fn with_baseline(self) -> Self {
        Self::new(move |error, retries| !error.kind().is_permanent() && self.test(error, retries))
    }

    /// Evaluate the predicate.
    pub fn test(&self, error: &ClassifiedError, retries: u32) -> bool {
        (self.0)(error, retries)
    }
}

/// Configuration for the single-operation engine.
///
/// Built once and handed to the engine, which never changes it.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor per retry; must be greater than 1.
    pub backoff_multiplier: f64,
    /// Retry condition.
    pub retry_predicate: RetryPredicate,
    /// Wait at least as long as a server-suggested delay.
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retry_predicate: RetryPredicate::default(),
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max retries.
    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Set initial delay.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set max delay.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the retry predicate.
    #[must_use]
    pub fn retry_predicate(mut self, predicate: RetryPredicate) -> Self {
        self.retry_predicate = predicate;
        self
    }

    /// Set the retry predicate from a closure.
    #[must_use]
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&ClassifiedError, u32) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate(RetryPredicate::new(predicate))
    }

    /// Set whether server-suggested delays are honored.
    #[must_use]
    pub fn respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Install the permanent-kind filter beneath the current predicate.
    #[must_use]
    pub fn with_baseline(mut self) -> Self {
        self.retry_predicate = self.retry_predicate.with_baseline();
        self
    }

    /// Create config for API calls with sensible defaults.
    pub fn for_api() -> Self {
        Self::new()
            .max_retries(3)
            .initial_delay(Duration::from_millis(500))
            .max_delay(Duration::from_secs(60))
            .with_baseline()
    }

    /// Create config that never retries.
    pub fn no_retry() -> Self {
        Self::new().max_retries(0)
    }

    /// Build from plain settings, validating the result.
    pub fn from_settings(settings: &BackoffSettings) -> Result<Self, ConfigError> {
        let config = Self::new()
            .max_retries(settings.max_retries)
            .initial_delay(Duration::from_millis(settings.initial_delay_ms))
            .max_delay(Duration::from_millis(settings.max_delay_ms))
            .backoff_multiplier(settings.backoff_multiplier)
            .respect_retry_after(settings.respect_retry_after);
        config.validate()?;
        Ok(config)
    }

    /// Check the numeric invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::DelayRange {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }

    /// Whether a failure allows another retry given the retries made so far.
    pub fn allows_retry(&self, error: &ClassifiedError, retries: u32) -> bool {
        retries < self.max_retries && self.retry_predicate.test(error, retries)
    }
}

/// Serializable backoff settings, for loading from a host's config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor per retry.
    pub backoff_multiplier: f64,
    /// Honor server-suggested delays.
    pub respect_retry_after: bool,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            respect_retry_after: true,
        }
    }
}

/// Configuration for the batch engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Items per chunk.
    pub batch_size: usize,
    /// Attempts allowed per chunk before it counts as failed.
    pub max_retries_per_chunk: u32,
    /// Continue past a failed chunk instead of aborting the batch.
    pub retry_failed_only: bool,
    /// Fixed wait between attempts on the same chunk.
    pub retry_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries_per_chunk: 3,
            retry_failed_only: true,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl BatchConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the per-chunk attempt cap.
    #[must_use]
    pub fn max_retries_per_chunk(mut self, n: u32) -> Self {
        self.max_retries_per_chunk = n;
        self
    }

    /// Set whether a failed chunk lets the batch continue.
    #[must_use]
    pub fn retry_failed_only(mut self, continue_on_failure: bool) -> Self {
        self.retry_failed_only = continue_on_failure;
        self
    }

    /// Set the wait between attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Check the invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    /// Attempts per chunk; a cap of zero still runs the chunk once.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries_per_chunk.max(1)
    }

    pub(crate) fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Serializable batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Items per chunk.
    pub batch_size: usize,
    /// Attempts per chunk.
    pub max_retries_per_chunk: u32,
    /// Continue past failed chunks.
    pub retry_failed_only: bool,
    /// Wait between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries_per_chunk: 3,
            retry_failed_only: true,
            retry_delay_ms: 1_000,
        }
    }
}

impl From<&BatchSettings> for BatchConfig {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            max_retries_per_chunk: settings.max_retries_per_chunk,
            retry_failed_only: settings.retry_failed_only,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opguard_core::ErrorKind;
    use pretty_assertions::assert_eq;

    fn error(kind: ErrorKind) -> ClassifiedError {
        ClassifiedError::new(kind, "test")
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(config.respect_retry_after);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RetryConfig::new()
            .max_retries(5)
            .initial_delay(Duration::from_millis(50))
            .max_delay(Duration::from_secs(10))
            .backoff_multiplier(3.0)
            .respect_retry_after(false);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.backoff_multiplier, 3.0);
        assert!(!config.respect_retry_after);
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            RetryConfig::new().backoff_multiplier(1.0).validate(),
            Err(ConfigError::InvalidMultiplier(1.0))
        );
        assert!(RetryConfig::new()
            .backoff_multiplier(f64::INFINITY)
            .validate()
            .is_err());
        assert_eq!(
            RetryConfig::new()
                .initial_delay(Duration::from_secs(5))
                .max_delay(Duration::from_secs(1))
                .validate(),
            Err(ConfigError::DelayRange {
                initial: Duration::from_secs(5),
                max: Duration::from_secs(1),
            })
        );
    }

    #[test]
    fn test_default_predicate_follows_kind() {
        let predicate = RetryPredicate::default();
        assert!(predicate.test(&error(ErrorKind::Network), 0));
        assert!(predicate.test(&error(ErrorKind::RateLimit), 2));
        assert!(!predicate.test(&error(ErrorKind::Validation), 0));
        assert!(!predicate.test(&error(ErrorKind::Unknown), 0));
    }

    #[test]
    fn test_baseline_overrides_permissive_predicate() {
        let predicate = RetryPredicate::always().with_baseline();
        for kind in ErrorKind::ALL {
            assert_eq!(predicate.test(&error(kind), 0), !kind.is_permanent());
        }
    }

    #[test]
    fn test_allows_retry_respects_cap() {
        let config = RetryConfig::new().max_retries(2).retry_predicate(RetryPredicate::always());
        let err = error(ErrorKind::Validation);
        assert!(config.allows_retry(&err, 0));
        assert!(config.allows_retry(&err, 1));
        assert!(!config.allows_retry(&err, 2));
    }

    #[test]
    fn test_api_config() {
        let config = RetryConfig::for_api();
        assert_eq!(config.max_retries, 3);
        assert!(config.allows_retry(&error(ErrorKind::ServerError), 0));
        assert!(!config.allows_retry(&error(ErrorKind::NotFound), 0));
    }

    #[test]
    fn test_no_retry() {
        let config = RetryConfig::no_retry();
        assert!(!config.allows_retry(&error(ErrorKind::Network), 0));
    }

    #[test]
    fn test_from_settings() {
        let settings: BackoffSettings =
            serde_json::from_str(r#"{"max_retries": 5, "initial_delay_ms": 200}"#).unwrap();
        let config = RetryConfig::from_settings(&settings).unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_secs(30));

        let bad = BackoffSettings {
            backoff_multiplier: 0.5,
            ..BackoffSettings::default()
        };
        assert!(RetryConfig::from_settings(&bad).is_err());
    }

    #[test]
    fn test_batch_config() {
        let config = BatchConfig::new()
            .batch_size(25)
            .max_retries_per_chunk(0)
            .retry_failed_only(false)
            .retry_delay(Duration::from_millis(10));

        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_attempts(), 1);
        assert!(!config.retry_failed_only);
        assert_eq!(
            BatchConfig::new().batch_size(0).validate(),
            Err(ConfigError::ZeroBatchSize)
        );
    }

    #[test]
    fn test_batch_settings() {
        let settings: BatchSettings = serde_json::from_str(r#"{"retry_delay_ms": 250}"#).unwrap();
        let config = BatchConfig::from(&settings);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
    }
}
