//! Retry wrapper with capped exponential backoff and jitter.

use conveyor_config::shared::RetryConfig;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{ConveyorError, ConveyorResult};

/// Immutable retry configuration applied by [`retry_with_policy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Fraction of the computed backoff added as uniform random jitter,
    /// within `[0.0, 1.0]`. Jitter avoids synchronized retry storms.
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    /// Creates a new policy.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_fraction: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
        }
    }

    /// Builds a policy from its configuration value.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_retry_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
            config.jitter_fraction,
        )
    }

    /// Policy that performs a single attempt, equivalent to a pass-through
    /// wrapper.
    pub fn no_retries() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 0.0)
    }

    /// Computes the delay before the retry following failure `attempt`
    /// (zero-based).
    ///
    /// `delay = min(base_delay * 2^attempt + uniform(0, jitter_fraction *
    /// backoff), max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let backoff = base * 2f64.powi(attempt.min(31) as i32);

        let jitter_window = backoff * self.jitter_fraction;
        let jitter = if jitter_window > 0.0 {
            rand::thread_rng().gen_range(0.0..=jitter_window)
        } else {
            0.0
        };

        let capped = (backoff + jitter).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Retries `op` according to `policy`, using error classification to decide
/// retryability.
///
/// Only transient errors are retried; permanent errors, circuit-open
/// fast-fails, and cancellation signals re-raise immediately.
pub async fn retry_with_policy<T, F>(
    policy: &RetryPolicy,
    operation: &'static str,
    op: F,
) -> ConveyorResult<T>
where
    F: AsyncFnMut() -> ConveyorResult<T>,
{
    retry_with_policy_if(policy, operation, ConveyorError::is_transient, op).await
}

/// Retries `op` according to `policy`, with an explicit retryability
/// predicate.
///
/// The operation is attempted up to `policy.max_attempts` times. A
/// non-retryable failure re-raises immediately; the final attempt's failure
/// re-raises unmodified; any success returns at once.
pub async fn retry_with_policy_if<T, P, F>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut is_retryable: P,
    mut op: F,
) -> ConveyorResult<T>
where
    P: FnMut(&ConveyorError) -> bool,
    F: AsyncFnMut() -> ConveyorResult<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) || attempt + 1 >= max_attempts {
                    return Err(err);
                }

                let delay = policy.backoff_delay(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying after backoff"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conveyor_error;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(5),
            0.0,
        )
    }

    #[tokio::test]
    async fn always_failing_op_is_attempted_exactly_max_times() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(4);

        let result: ConveyorResult<()> = retry_with_policy(&policy, "always_fails", async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(conveyor_error!(
                ErrorKind::SourceReadFailed,
                "Read failed",
                format!("attempt {}", attempts.load(Ordering::SeqCst))
            ))
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // The final raised error is the last attempt's error, unmodified.
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceReadFailed);
        assert_eq!(err.detail(), Some("attempt 4"));
    }

    #[tokio::test]
    async fn non_retryable_error_is_attempted_exactly_once() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(5);

        let result: ConveyorResult<()> = retry_with_policy(&policy, "permanent", async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(conveyor_error!(ErrorKind::InvalidRecord, "Malformed input"))
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidRecord);
    }

    #[tokio::test]
    async fn success_returns_immediately_without_further_attempts() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(5);

        let value = retry_with_policy(&policy, "flaky", async || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                Err(conveyor_error!(ErrorKind::SourceReadFailed, "Read failed"))
            } else {
                Ok(99)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 99);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_attempt_policy_is_a_pass_through() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::no_retries();

        let result: ConveyorResult<()> = retry_with_policy(&policy, "no_retry", async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(conveyor_error!(ErrorKind::SourceReadFailed, "Read failed"))
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn circuit_open_is_not_retried_by_default() {
        let attempts = AtomicU32::new(0);
        let policy = fast_policy(5);

        let result: ConveyorResult<()> = retry_with_policy(&policy, "open_circuit", async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(conveyor_error!(ErrorKind::CircuitOpen, "Circuit is open"))
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().is_circuit_open());
    }

    #[test]
    fn backoff_doubles_and_caps_without_jitter() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(100),
            Duration::from_millis(450),
            0.0,
        );

        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        // Capped by max_delay from here on.
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(450));
        assert_eq!(policy.backoff_delay(20), Duration::from_millis(450));
    }

    #[test]
    fn jitter_stays_within_its_window() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(100),
            Duration::from_secs(60),
            0.5,
        );

        for _ in 0..100 {
            let delay = policy.backoff_delay(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }
}
