use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for automatic retries of transient failures.
///
/// Controls the exponential backoff applied between attempts when a wrapped
/// operation fails with a retryable error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    ///
    /// A value of 1 disables retries entirely.
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    ///
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 200ms
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Maximum delay between attempts.
    ///
    /// The backoff algorithm will not exceed this delay.
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 10000ms (10 seconds)
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Fraction of the computed backoff added as uniform random jitter.
    ///
    /// Must be within `[0.0, 1.0]`. Jitter spreads out retries from callers
    /// that failed at the same instant.
    /// Default: 0.2
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

impl RetryConfig {
    /// Default maximum number of attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default initial retry delay in milliseconds.
    pub const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 200;

    /// Default maximum retry delay in milliseconds.
    pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 10_000;

    /// Default jitter fraction.
    pub const DEFAULT_JITTER_FRACTION: f64 = 0.2;

    /// Validates retry configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::RetryMaxAttemptsZero);
        }

        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(ValidationError::JitterFractionOutOfRange);
        }

        if self.max_retry_delay_ms < self.initial_retry_delay_ms {
            return Err(ValidationError::MaxRetryDelayBelowInitial);
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

fn default_max_attempts() -> u32 {
    RetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_retry_delay_ms() -> u64 {
    RetryConfig::DEFAULT_INITIAL_RETRY_DELAY_MS
}

fn default_max_retry_delay_ms() -> u64 {
    RetryConfig::DEFAULT_MAX_RETRY_DELAY_MS
}

fn default_jitter_fraction() -> f64 {
    RetryConfig::DEFAULT_JITTER_FRACTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_config_is_valid() {
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::RetryMaxAttemptsZero)
        ));
    }

    #[test]
    fn jitter_fraction_outside_unit_interval_is_rejected() {
        let config = RetryConfig {
            jitter_fraction: 1.5,
            ..RetryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::JitterFractionOutOfRange)
        ));
    }

    #[test]
    fn max_delay_below_initial_is_rejected() {
        let config = RetryConfig {
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 100,
            ..RetryConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MaxRetryDelayBelowInitial)
        ));
    }
}
