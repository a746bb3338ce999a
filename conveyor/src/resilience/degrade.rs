//! Graceful degradation over a fan-out of guarded calls.

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use std::collections::BTreeSet;
use tracing::warn;

use crate::error::ConveyorResult;
use crate::types::{DegradedBatchResult, Record, SourceId};

/// One fallible fetch in a degradation fan-out, tagged with the source it
/// belongs to.
///
/// The call should already carry whatever resilience it needs underneath:
/// retries compose inside, a circuit breaker around those. The aggregator
/// itself never retries.
pub struct GuardedCall {
    source_id: SourceId,
    call: BoxFuture<'static, ConveyorResult<Vec<Record>>>,
}

impl GuardedCall {
    /// Creates a guarded call for `source_id`.
    pub fn new<F>(source_id: SourceId, call: F) -> Self
    where
        F: Future<Output = ConveyorResult<Vec<Record>>> + Send + 'static,
    {
        Self {
            source_id,
            call: call.boxed(),
        }
    }

    /// Returns the source this call fetches from.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }
}

/// Runs all guarded calls concurrently and combines whatever succeeded.
///
/// Every call is awaited to resolution; no single failure aborts the round.
/// A failed call, whatever its error class (retry-exhausted transient,
/// permanent, or circuit-open fast-fail), becomes an entry in
/// `unavailable_sources` instead of propagating. This is the only place in
/// the core where failures are swallowed; that is the whole point of the
/// aggregator.
///
/// Available records keep the declaration order of `calls`, regardless of
/// completion order.
pub async fn aggregate(calls: Vec<GuardedCall>) -> DegradedBatchResult {
    let (source_ids, futures): (Vec<_>, Vec<_>) = calls
        .into_iter()
        .map(|call| (call.source_id, call.call))
        .unzip();

    let outcomes = join_all(futures).await;

    let mut available = Vec::new();
    let mut unavailable_sources = BTreeSet::new();

    for (source_id, outcome) in source_ids.into_iter().zip(outcomes) {
        match outcome {
            Ok(records) => available.extend(records),
            Err(err) => {
                warn!(
                    %source_id,
                    kind = ?err.kind(),
                    error = %err,
                    "source unavailable, continuing with partial results"
                );

                unavailable_sources.insert(source_id);
            }
        }
    }

    DegradedBatchResult::new(available, unavailable_sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conveyor_error;
    use crate::error::ErrorKind;
    use crate::types::Value;
    use std::time::Duration;
    use tokio::time::sleep;

    fn records_for(source_id: SourceId, count: usize) -> Vec<Record> {
        (0..count)
            .map(|seq| {
                Record::new(
                    source_id,
                    vec![("seq".to_string(), Value::Int(seq as i64))],
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn combines_successes_and_tags_failures() {
        let calls = vec![
            GuardedCall::new(SourceId(1), async { Ok(records_for(SourceId(1), 2)) }),
            GuardedCall::new(SourceId(2), async {
                Err(conveyor_error!(ErrorKind::SourceReadFailed, "Read failed"))
            }),
            GuardedCall::new(SourceId(3), async { Ok(records_for(SourceId(3), 3)) }),
        ];

        let result = aggregate(calls).await;

        assert_eq!(result.available().len(), 5);
        assert_eq!(
            result.unavailable_sources(),
            &BTreeSet::from([SourceId(2)])
        );
        assert!(result.is_degraded());
    }

    #[tokio::test]
    async fn complete_round_is_not_degraded() {
        let calls = vec![
            GuardedCall::new(SourceId(1), async { Ok(records_for(SourceId(1), 1)) }),
            GuardedCall::new(SourceId(2), async { Ok(records_for(SourceId(2), 1)) }),
        ];

        let result = aggregate(calls).await;

        assert!(!result.is_degraded());
        assert!(result.unavailable_sources().is_empty());
    }

    #[tokio::test]
    async fn never_raises_even_when_every_call_fails() {
        let calls: Vec<_> = (1..=4)
            .map(|id| {
                GuardedCall::new(SourceId(id), async {
                    Err(conveyor_error!(ErrorKind::CircuitOpen, "Circuit is open"))
                })
            })
            .collect();

        let result = aggregate(calls).await;

        assert!(result.available().is_empty());
        assert_eq!(result.unavailable_sources().len(), 4);
        assert!(result.is_degraded());
    }

    #[tokio::test]
    async fn available_records_keep_call_declaration_order() {
        // The first call completes last; its records must still come first.
        let calls = vec![
            GuardedCall::new(SourceId(1), async {
                sleep(Duration::from_millis(30)).await;
                Ok(records_for(SourceId(1), 1))
            }),
            GuardedCall::new(SourceId(2), async { Ok(records_for(SourceId(2), 1)) }),
        ];

        let result = aggregate(calls).await;

        let order: Vec<_> = result
            .available()
            .iter()
            .map(|record| record.source_id())
            .collect();
        assert_eq!(order, vec![SourceId(1), SourceId(2)]);
    }
}
