//! Backoff calculation.
//!
//! `delay(attempt)` is `initial_delay * backoff_multiplier^attempt`, clamped to
//! `max_delay`, plus up to 10% positive jitter. `attempt` is zero-based: the
//! first retry uses attempt 0.

use crate::config::RetryConfig;
use opguard_core::ClassifiedError;
use rand::Rng;
use std::time::Duration;

/// Upper bound of the jitter, as a fraction of the base delay.
pub const JITTER_RATIO: f64 = 0.1;

/// Un-jittered delay for a retry attempt, clamped to `max_delay`.
pub fn base_delay(attempt: u32, config: &RetryConfig) -> Duration {
    if config.initial_delay.is_zero() {
        return Duration::ZERO;
    }
    let max = config.max_delay.as_secs_f64();
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !base.is_finite() || base >= max {
        return config.max_delay;
    }
    Duration::try_from_secs_f64(base.max(0.0)).unwrap_or(config.max_delay)
}

/// Delay for a retry attempt, with jitter from the thread-local RNG.
pub fn delay(attempt: u32, config: &RetryConfig) -> Duration {
    delay_with_rng(attempt, config, &mut rand::thread_rng())
}

/// Delay for a retry attempt, drawing jitter from `rng`.
pub fn delay_with_rng<R: Rng + ?Sized>(attempt: u32, config: &RetryConfig, rng: &mut R) -> Duration {
    let base = base_delay(attempt, config);
    let jitter = scale(base, rng.gen_range(0.0..=JITTER_RATIO));
    base.saturating_add(jitter)
}

/// Delay before retrying after `error`.
///
/// When the config honors server hints and the error carries one, the longer
/// of the backoff delay and the hint is used, never exceeding the jittered cap.
pub fn delay_for_error(attempt: u32, config: &RetryConfig, error: &ClassifiedError) -> Duration {
    let backoff = delay(attempt, config);
    match error.retry_after() {
        Some(hint) if config.respect_retry_after => {
            let cap = scale(config.max_delay, 1.0 + JITTER_RATIO);
            backoff.max(hint).min(cap.max(backoff))
        }
        _ => backoff,
    }
}

/// `duration * factor`, saturating at `Duration::MAX`.
fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opguard_core::ErrorKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;

    fn config() -> RetryConfig {
        RetryConfig::new()
            .initial_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_secs(30))
            .backoff_multiplier(2.0)
    }

    #[rstest]
    #[case(0, 1_000)]
    #[case(1, 2_000)]
    #[case(2, 4_000)]
    #[case(3, 8_000)]
    #[case(4, 16_000)]
    #[case(5, 30_000)]
    #[case(40, 30_000)]
    fn test_base_delay(#[case] attempt: u32, #[case] expected_ms: u64) {
        assert_eq!(base_delay(attempt, &config()), Duration::from_millis(expected_ms));
    }

    #[test]
    fn test_delay_bounds() {
        let config = config();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..20 {
            for _ in 0..50 {
                let d = delay_with_rng(attempt, &config, &mut rng);
                let base = base_delay(attempt, &config);
                assert!(d >= base, "attempt {attempt}: {d:?} < {base:?}");
                assert!(d <= base.mul_f64(1.0 + JITTER_RATIO));
                assert!(d <= config.max_delay.mul_f64(1.0 + JITTER_RATIO));
            }
        }
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let config = config();
        assert_eq!(base_delay(u32::MAX, &config), config.max_delay);
    }

    #[test]
    fn test_unbounded_max_delay() {
        let config = config().max_delay(Duration::MAX);
        assert!(config.validate().is_ok());

        assert_eq!(base_delay(3, &config), Duration::from_secs(8));
        assert_eq!(base_delay(70, &config), Duration::MAX);
        assert_eq!(delay(70, &config), Duration::MAX);
        assert_eq!(delay(u32::MAX, &config), Duration::MAX);

        let err = ClassifiedError::new(ErrorKind::RateLimit, "slow down")
            .with_retry_after(Some(Duration::from_secs(90)));
        assert_eq!(delay_for_error(0, &config, &err), Duration::from_secs(90));
        assert_eq!(delay_for_error(70, &config, &err), Duration::MAX);
    }

    #[test]
    fn test_zero_initial_delay() {
        let config = config().initial_delay(Duration::ZERO);
        assert_eq!(delay(u32::MAX, &config), Duration::ZERO);
    }

    #[test]
    fn test_retry_after_extends_delay() {
        let config = config();
        let err = ClassifiedError::new(ErrorKind::RateLimit, "slow down")
            .with_retry_after(Some(Duration::from_secs(10)));

        assert_eq!(delay_for_error(0, &config, &err), Duration::from_secs(10));

        let ignoring = config.clone().respect_retry_after(false);
        assert!(delay_for_error(0, &ignoring, &err) < Duration::from_secs(2));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let config = config();
        let err = ClassifiedError::new(ErrorKind::RateLimit, "slow down")
            .with_retry_after(Some(Duration::from_secs(3600)));

        assert_eq!(delay_for_error(0, &config, &err), Duration::from_secs(33));
    }
}
