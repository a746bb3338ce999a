use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use conveyor::conveyor_error;
use conveyor::error::{ConveyorResult, ErrorKind};
use conveyor::resilience::breaker::{CircuitBreaker, CircuitState};
use conveyor::resilience::degrade::{GuardedCall, aggregate};
use conveyor::resilience::retry::{RetryPolicy, retry_with_policy};
use conveyor::sink::Sink;
use conveyor::sink::memory::MemorySink;
use conveyor::test_utils::source::sample_record;
use conveyor::types::{Record, SourceId};
use conveyor_config::shared::CircuitBreakerConfig;
use conveyor_telemetry::init_test_tracing;

fn records_for(source_id: SourceId, count: usize) -> Vec<Record> {
    (0..count)
        .map(|seq| sample_record(source_id, seq as i64))
        .collect()
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(1),
        Duration::from_millis(5),
        0.0,
    )
}

#[tokio::test]
async fn degraded_fanout_composes_retries_and_breakers() {
    init_test_tracing();

    let policy = fast_policy(2);
    let breaker_config = CircuitBreakerConfig {
        failure_threshold: 3,
        reset_timeout_ms: 1000,
    };
    let breaker_1 = Arc::new(CircuitBreaker::from_config("source-1", &breaker_config));
    let breaker_2 = Arc::new(CircuitBreaker::from_config("source-2", &breaker_config));
    let breaker_3 = Arc::new(CircuitBreaker::from_config("source-3", &breaker_config));

    let failing_attempts = Arc::new(AtomicU32::new(0));

    let calls = vec![
        GuardedCall::new(SourceId(1), {
            let breaker = breaker_1.clone();
            async move {
                breaker
                    .call(async || Ok(records_for(SourceId(1), 2)))
                    .await
            }
        }),
        GuardedCall::new(SourceId(2), {
            let breaker = breaker_2.clone();
            let attempts = failing_attempts.clone();
            async move {
                breaker
                    .call(async || {
                        retry_with_policy(&policy, "fetch source 2", async || {
                            attempts.fetch_add(1, Ordering::SeqCst);
                            Err::<Vec<Record>, _>(conveyor_error!(
                                ErrorKind::SourceReadFailed,
                                "Dependency is down"
                            ))
                        })
                        .await
                    })
                    .await
            }
        }),
        GuardedCall::new(SourceId(3), {
            let breaker = breaker_3.clone();
            async move {
                breaker
                    .call(async || Ok(records_for(SourceId(3), 2)))
                    .await
            }
        }),
    ];

    let result = aggregate(calls).await;

    assert!(result.is_degraded());
    assert_eq!(result.available().len(), 4);
    assert_eq!(result.unavailable_sources(), &BTreeSet::from([SourceId(2)]));

    // The retry wrapper ran underneath the breaker: two attempts, observed
    // by the breaker as a single failure.
    assert_eq!(failing_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(breaker_2.consecutive_failures(), 1);
    assert_eq!(breaker_2.state(), CircuitState::Closed);

    // The degraded result reaches the sink as an explicit partial result.
    let sink = MemorySink::new();
    sink.write_degraded(result.clone()).await.unwrap();
    assert_eq!(sink.degraded_results().await, vec![result]);
}

#[tokio::test]
async fn open_circuit_degrades_without_contacting_the_dependency() {
    init_test_tracing();

    let breaker = Arc::new(CircuitBreaker::new("dep", 1, Duration::from_secs(60)));
    let dependency_calls = Arc::new(AtomicU32::new(0));

    // Trip the breaker.
    let tripped: ConveyorResult<Vec<Record>> = breaker
        .call(async || {
            dependency_calls.fetch_add(1, Ordering::SeqCst);
            Err(conveyor_error!(
                ErrorKind::SourceReadFailed,
                "Dependency is down"
            ))
        })
        .await;
    assert!(tripped.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);

    let calls = vec![
        GuardedCall::new(SourceId(1), async { Ok(records_for(SourceId(1), 3)) }),
        GuardedCall::new(SourceId(2), {
            let breaker = breaker.clone();
            let dependency_calls = dependency_calls.clone();
            async move {
                breaker
                    .call(async || {
                        dependency_calls.fetch_add(1, Ordering::SeqCst);
                        Ok(records_for(SourceId(2), 3))
                    })
                    .await
            }
        }),
    ];

    let result = aggregate(calls).await;

    assert!(result.is_degraded());
    assert_eq!(result.available().len(), 3);
    assert_eq!(result.unavailable_sources(), &BTreeSet::from([SourceId(2)]));

    // The fast-fail never reached the guarded dependency.
    assert_eq!(dependency_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recovered_dependency_returns_to_complete_results() {
    init_test_tracing();

    let breaker = Arc::new(CircuitBreaker::new("dep", 1, Duration::from_millis(30)));

    let tripped: ConveyorResult<Vec<Record>> = breaker
        .call(async || {
            Err(conveyor_error!(
                ErrorKind::SourceReadFailed,
                "Dependency is down"
            ))
        })
        .await;
    assert!(tripped.is_err());

    // After the reset timeout the next fan-out probes the dependency, which
    // has recovered, and the round is complete again.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = vec![
        GuardedCall::new(SourceId(1), async { Ok(records_for(SourceId(1), 1)) }),
        GuardedCall::new(SourceId(2), {
            let breaker = breaker.clone();
            async move {
                breaker
                    .call(async || Ok(records_for(SourceId(2), 1)))
                    .await
            }
        }),
    ];

    let result = aggregate(calls).await;

    assert!(!result.is_degraded());
    assert_eq!(result.available().len(), 2);
    assert_eq!(breaker.state(), CircuitState::Closed);
}
