use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::error::ConveyorResult;
use crate::sink::Sink;
use crate::sink::memory::MemorySink;
use crate::test_utils::notify::{DEFAULT_NOTIFY_TIMEOUT, TimedNotify};
use crate::types::{DegradedBatchResult, Record};

/// A [`MemorySink`] wrapper that notifies on every write.
///
/// Lets tests wait for output to arrive instead of sleeping, both for "at
/// least one write happened" and for "N records were delivered".
#[derive(Debug, Clone, Default)]
pub struct NotifyingSink {
    inner: MemorySink,
    write_event: Arc<Notify>,
}

impl NotifyingSink {
    /// Creates a new empty notifying sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all written records flattened across batches, in write order.
    pub async fn records(&self) -> Vec<Record> {
        self.inner.records().await
    }

    /// Returns all written batches, in write order.
    pub async fn batches(&self) -> Vec<Vec<Record>> {
        self.inner.batches().await
    }

    /// Returns the total number of records written so far.
    pub async fn record_count(&self) -> usize {
        self.inner.record_count().await
    }

    /// Returns all written degraded results, in write order.
    pub async fn degraded_results(&self) -> Vec<DegradedBatchResult> {
        self.inner.degraded_results().await
    }

    /// Returns a waiter that resolves on the next write.
    pub fn write_notify(&self) -> TimedNotify {
        TimedNotify::new(self.write_event.clone())
    }

    /// Suspends until at least `count` records were written.
    ///
    /// # Panics
    ///
    /// Panics after 30 seconds, like [`TimedNotify`], so a wedged pipeline
    /// fails the test instead of hanging it.
    pub async fn wait_for_records(&self, count: usize) {
        let reached = timeout(DEFAULT_NOTIFY_TIMEOUT, async {
            loop {
                // Register interest before checking so a write between the
                // check and the wait cannot be missed.
                let notified = self.write_event.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.inner.record_count().await >= count {
                    return;
                }

                notified.await;
            }
        })
        .await;

        if reached.is_err() {
            panic!("timed out waiting for {count} records to reach the sink");
        }
    }
}

impl Sink for NotifyingSink {
    fn name() -> &'static str {
        "notifying"
    }

    async fn write_batch(&self, records: Vec<Record>) -> ConveyorResult<()> {
        self.inner.write_batch(records).await?;
        self.write_event.notify_waiters();
        Ok(())
    }

    async fn write_degraded(&self, result: DegradedBatchResult) -> ConveyorResult<()> {
        self.inner.write_degraded(result).await?;
        self.write_event.notify_waiters();
        Ok(())
    }
}
