use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ConveyorResult;
use crate::sink::Sink;
use crate::types::{DegradedBatchResult, Record};

#[derive(Debug, Default)]
struct Inner {
    batches: Vec<Vec<Record>>,
    degraded_results: Vec<DegradedBatchResult>,
}

/// In-memory sink for testing and development purposes.
///
/// [`MemorySink`] stores everything it receives in memory, making it ideal
/// for inspecting pipeline output in tests. All data is lost when the
/// process terminates.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    /// Creates a new empty memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all written batches, in write order.
    pub async fn batches(&self) -> Vec<Vec<Record>> {
        self.inner.lock().await.batches.clone()
    }

    /// Returns all written records flattened across batches, in write order.
    pub async fn records(&self) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner.batches.iter().flatten().cloned().collect()
    }

    /// Returns the total number of records written so far.
    pub async fn record_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.batches.iter().map(Vec::len).sum()
    }

    /// Returns all written degraded results, in write order.
    pub async fn degraded_results(&self) -> Vec<DegradedBatchResult> {
        self.inner.lock().await.degraded_results.clone()
    }
}

impl Sink for MemorySink {
    fn name() -> &'static str {
        "memory"
    }

    async fn write_batch(&self, records: Vec<Record>) -> ConveyorResult<()> {
        let mut inner = self.inner.lock().await;
        info!(records = records.len(), "memory sink received batch");
        inner.batches.push(records);
        Ok(())
    }

    async fn write_degraded(&self, result: DegradedBatchResult) -> ConveyorResult<()> {
        let mut inner = self.inner.lock().await;
        info!(
            available = result.available().len(),
            unavailable = result.unavailable_sources().len(),
            "memory sink received degraded result"
        );
        inner.degraded_results.push(result);
        Ok(())
    }
}
