use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for circuit breakers guarding external dependencies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures after which the circuit opens.
    /// Default: 5
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe call is admitted.
    ///
    /// Specified in milliseconds for serialization compatibility.
    /// Default: 30000ms (30 seconds)
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    /// Default consecutive failure threshold.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

    /// Default reset timeout in milliseconds.
    pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 30_000;

    /// Validates circuit breaker configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.failure_threshold == 0 {
            return Err(ValidationError::BreakerFailureThresholdZero);
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    CircuitBreakerConfig::DEFAULT_FAILURE_THRESHOLD
}

fn default_reset_timeout_ms() -> u64 {
    CircuitBreakerConfig::DEFAULT_RESET_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_breaker_config_is_valid() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_failure_threshold_is_rejected() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            reset_timeout_ms: 1000,
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::BreakerFailureThresholdZero)
        ));
    }
}
