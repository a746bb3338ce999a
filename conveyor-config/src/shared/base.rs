use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Channel capacity cannot be zero.
    #[error("`channel_capacity` cannot be zero")]
    ChannelCapacityZero,
    /// Maximum batch size cannot be zero.
    #[error("`batch.max_size` cannot be zero")]
    BatchMaxSizeZero,
    /// Maximum compute workers cannot be zero.
    #[error("`max_compute_workers` cannot be zero")]
    MaxComputeWorkersZero,
    /// Maximum retry attempts cannot be zero.
    #[error("`retry.max_attempts` cannot be zero")]
    RetryMaxAttemptsZero,
    /// Jitter fraction must stay within the unit interval.
    #[error("`retry.jitter_fraction` must be within [0.0, 1.0]")]
    JitterFractionOutOfRange,
    /// Maximum retry delay cannot undercut the initial delay.
    #[error("`retry.max_retry_delay_ms` cannot be smaller than `retry.initial_retry_delay_ms`")]
    MaxRetryDelayBelowInitial,
    /// Circuit breaker failure threshold cannot be zero.
    #[error("`breaker.failure_threshold` cannot be zero")]
    BreakerFailureThresholdZero,
}
