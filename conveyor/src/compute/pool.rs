use std::sync::Arc;
use tokio::sync::{Semaphore, oneshot};
use tracing::debug;

use crate::compute::BatchTransform;
use crate::concurrency::future::PendingUnit;
use crate::conveyor_error;
use crate::error::ErrorKind;
use crate::types::RecordBatch;

/// Bridge into the parallel worker domain.
///
/// The pool executes batch transforms on blocking workers, at most
/// `worker_count` at a time. Submission is non-blocking: it immediately
/// returns a [`PendingUnit`] the cooperative side can await without
/// blocking, while the computation queues for a worker slot and runs in
/// parallel.
///
/// Workers share no mutable state; each receives one self-contained batch
/// and returns one self-contained result.
#[derive(Debug, Clone)]
pub struct ComputePool {
    permits: Arc<Semaphore>,
    worker_count: usize,
}

impl ComputePool {
    /// Creates a pool with the given number of parallel workers.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);

        Self {
            permits: Arc::new(Semaphore::new(worker_count)),
            worker_count,
        }
    }

    /// Returns the number of parallel workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Submits a batch for transformation and returns its pending unit
    /// immediately.
    ///
    /// The transform starts once a worker slot frees up. Cancelling the unit
    /// before that point means the transform never runs; cancelling after
    /// lets the in-flight computation finish on its worker, but the result
    /// is discarded.
    pub fn submit<T>(&self, transform: Arc<T>, batch: RecordBatch) -> PendingUnit<RecordBatch>
    where
        T: BatchTransform,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let permits = self.permits.clone();
        let batch_id = batch.id();

        let driver = tokio::spawn(async move {
            // The semaphore is owned by the pool and never closed while
            // submissions exist, so acquisition can only fail after the
            // whole pool was dropped mid-flight.
            let Ok(permit) = permits.acquire_owned().await else {
                return;
            };

            let join_result =
                tokio::task::spawn_blocking(move || transform.apply(batch)).await;
            drop(permit);

            let result = join_result.unwrap_or_else(|join_err| {
                Err(conveyor_error!(
                    ErrorKind::ComputeWorkerPanic,
                    "Batch transform panicked",
                    join_err
                ))
            });

            // The receiver is gone when the unit was cancelled; the computed
            // result is discarded in that case.
            if result_tx.send(result).is_err() {
                debug!(batch_id, "discarding result of cancelled batch submission");
            }
        });

        PendingUnit::new(result_rx, driver.abort_handle())
    }
}
