use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, CircuitBreakerConfig, RetryConfig, ValidationError};

/// Configuration for a conveyor pipeline.
///
/// Contains all settings required to run an ingestion-to-computation bridge:
/// channel capacity, batching parameters, compute parallelism, and the
/// resilience knobs applied around fallible calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The unique identifier for this pipeline.
    ///
    /// Only used to label logs and spans; pipelines do not share state.
    pub id: u64,
    /// Capacity of the bounded channel between the ingest workers and the
    /// dispatch worker. This is the sole buffering point of the core and the
    /// mechanism through which a slow consumer pushes back on producers.
    /// Default: 1024
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Batch grouping configuration for the dispatch stage.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Maximum number of compute workers executing batch transforms in
    /// parallel.
    /// Default: 4
    #[serde(default = "default_max_compute_workers")]
    pub max_compute_workers: u16,
    /// Retry behavior applied to source reads, batch submissions, and sink
    /// writes.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker settings for guarded dependencies.
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
}

impl PipelineConfig {
    /// Default channel capacity.
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

    /// Default maximum number of compute workers.
    pub const DEFAULT_MAX_COMPUTE_WORKERS: u16 = 4;

    /// Validates pipeline configuration settings.
    ///
    /// Checks every nested section and ensures capacities and worker counts
    /// are non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel_capacity == 0 {
            return Err(ValidationError::ChannelCapacityZero);
        }

        if self.max_compute_workers == 0 {
            return Err(ValidationError::MaxComputeWorkersZero);
        }

        self.batch.validate()?;
        self.retry.validate()?;
        self.breaker.validate()?;

        Ok(())
    }
}

fn default_channel_capacity() -> usize {
    PipelineConfig::DEFAULT_CHANNEL_CAPACITY
}

fn default_max_compute_workers() -> u16 {
    PipelineConfig::DEFAULT_MAX_COMPUTE_WORKERS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            id: 1,
            channel_capacity: PipelineConfig::DEFAULT_CHANNEL_CAPACITY,
            batch: BatchConfig::default(),
            max_compute_workers: PipelineConfig::DEFAULT_MAX_COMPUTE_WORKERS,
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
        }
    }

    #[test]
    fn default_pipeline_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let mut config = config();
        config.channel_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ChannelCapacityZero)
        ));
    }

    #[test]
    fn zero_compute_workers_is_rejected() {
        let mut config = config();
        config.max_compute_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MaxComputeWorkersZero)
        ));
    }

    #[test]
    fn nested_sections_are_validated() {
        let mut config = config();
        config.retry.jitter_fraction = 2.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::JitterFractionOutOfRange)
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(config.id, 7);
        assert_eq!(
            config.channel_capacity,
            PipelineConfig::DEFAULT_CHANNEL_CAPACITY
        );
        assert_eq!(config.batch.max_size, BatchConfig::DEFAULT_MAX_SIZE);
        assert_eq!(config.retry.max_attempts, RetryConfig::DEFAULT_MAX_ATTEMPTS);
    }
}
