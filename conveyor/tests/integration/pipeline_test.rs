use std::collections::HashSet;
use std::time::Duration;

use conveyor::error::ErrorKind;
use conveyor::pipeline::Pipeline;
use conveyor::test_utils::sink::NotifyingSink;
use conveyor::test_utils::source::ScriptedSource;
use conveyor::test_utils::transform::{FlakyTransform, IdentityTransform, UppercaseTransform};
use conveyor::types::{Record, SourceId, Value};
use conveyor::conveyor_error;
use conveyor_config::shared::{BatchConfig, CircuitBreakerConfig, PipelineConfig, RetryConfig};
use conveyor_telemetry::init_test_tracing;

fn config(channel_capacity: usize, batch_size: usize, workers: u16) -> PipelineConfig {
    PipelineConfig {
        id: 1,
        channel_capacity,
        batch: BatchConfig {
            max_size: batch_size,
            max_fill_ms: 50,
        },
        max_compute_workers: workers,
        retry: RetryConfig {
            max_attempts: 3,
            initial_retry_delay_ms: 1,
            max_retry_delay_ms: 10,
            jitter_fraction: 0.0,
        },
        breaker: CircuitBreakerConfig::default(),
    }
}

fn seq_of(record: &Record) -> i64 {
    record.get("seq").and_then(Value::as_int).unwrap()
}

#[tokio::test]
async fn end_to_end_delivers_every_record_with_per_source_order() {
    init_test_tracing();

    // 4 sources x 5 records through a channel of capacity 10, dispatched in
    // batches of 8 across 2 compute workers.
    let sources: Vec<_> = (1..=4)
        .map(|id| {
            ScriptedSource::emitting(SourceId(id), 5)
                .with_read_delay(Duration::from_millis(id as u64))
        })
        .collect();
    let sink = NotifyingSink::new();

    let mut pipeline = Pipeline::new(
        1,
        config(10, 8, 2),
        sources,
        UppercaseTransform,
        sink.clone(),
    );
    pipeline.start().await.unwrap();
    pipeline.wait().await.unwrap();

    let records = sink.records().await;
    assert_eq!(records.len(), 20);

    // No duplicates and no loss.
    let mut seen = HashSet::new();
    for record in &records {
        assert!(seen.insert((record.source_id(), seq_of(record))));
    }

    // Order within each source is preserved; interleaving across sources is
    // free.
    for id in 1..=4 {
        let seqs: Vec<_> = records
            .iter()
            .filter(|record| record.source_id() == SourceId(id))
            .map(seq_of)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    // The transform ran on every record.
    let payload = records[0].get("payload").and_then(Value::as_str).unwrap();
    assert!(payload.starts_with("RECORD-"));
}

#[tokio::test]
async fn failed_source_does_not_abort_the_others() {
    init_test_tracing();

    let failing = ScriptedSource::new(SourceId(1))
        .then_emit_sample(0)
        .then_emit_sample(1)
        .then_fail(conveyor_error!(ErrorKind::InvalidRecord, "Malformed input"));
    let sources = vec![
        failing,
        ScriptedSource::emitting(SourceId(2), 5),
        ScriptedSource::emitting(SourceId(3), 5),
    ];
    let sink = NotifyingSink::new();

    let mut pipeline = Pipeline::new(1, config(16, 4, 2), sources, IdentityTransform, sink.clone());
    pipeline.start().await.unwrap();

    let err = pipeline.wait().await.unwrap_err();
    assert!(err.kinds().contains(&ErrorKind::InvalidRecord));

    // The healthy sources delivered everything; the failing one delivered
    // what it produced before the malformed read.
    let records = sink.records().await;
    for id in 2..=3 {
        let count = records
            .iter()
            .filter(|record| record.source_id() == SourceId(id))
            .count();
        assert_eq!(count, 5);
    }
    let failed_count = records
        .iter()
        .filter(|record| record.source_id() == SourceId(1))
        .count();
    assert_eq!(failed_count, 2);
}

#[tokio::test]
async fn transient_compute_failures_are_absorbed_by_retries() {
    init_test_tracing();

    let sources = vec![ScriptedSource::emitting(SourceId(1), 12)];
    let sink = NotifyingSink::new();
    // The first two applications fail transiently; the configured three
    // attempts absorb both failures.
    let transform = FlakyTransform::new(2, ErrorKind::IoError);

    let mut pipeline = Pipeline::new(1, config(16, 12, 2), sources, transform, sink.clone());
    pipeline.start().await.unwrap();
    pipeline.wait().await.unwrap();

    assert_eq!(sink.record_count().await, 12);
}

#[tokio::test]
async fn shutdown_stops_a_running_pipeline_without_data_corruption() {
    init_test_tracing();

    let sources: Vec<_> = (1..=2)
        .map(|id| {
            ScriptedSource::emitting(SourceId(id), 10_000)
                .with_read_delay(Duration::from_millis(1))
        })
        .collect();
    let sink = NotifyingSink::new();

    let mut pipeline = Pipeline::new(1, config(10, 8, 2), sources, IdentityTransform, sink.clone());
    pipeline.start().await.unwrap();

    // Let some output arrive, then stop.
    sink.write_notify().notified().await;
    sink.wait_for_records(8).await;
    pipeline.shutdown_and_wait().await.unwrap();

    let records = sink.records().await;
    assert!(!records.is_empty());
    assert!(records.len() < 20_000);

    // Whatever was delivered is duplicate-free and in per-source order.
    let mut seen = HashSet::new();
    for record in &records {
        assert!(seen.insert((record.source_id(), seq_of(record))));
    }
    for id in 1..=2 {
        let seqs: Vec<_> = records
            .iter()
            .filter(|record| record.source_id() == SourceId(id))
            .map(seq_of)
            .collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }
}

#[tokio::test]
async fn starting_twice_is_an_invalid_state() {
    let sources = vec![ScriptedSource::emitting(SourceId(1), 1)];
    let sink = NotifyingSink::new();

    let mut pipeline = Pipeline::new(1, config(4, 2, 1), sources, IdentityTransform, sink);
    pipeline.start().await.unwrap();

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    pipeline.wait().await.unwrap();
}

#[tokio::test]
async fn invalid_configuration_is_rejected_at_start() {
    let sources = vec![ScriptedSource::emitting(SourceId(1), 1)];
    let sink = NotifyingSink::new();
    let mut config = config(4, 2, 1);
    config.channel_capacity = 0;

    let mut pipeline = Pipeline::new(1, config, sources, IdentityTransform, sink);
    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}
