use conveyor_config::shared::PipelineConfig;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Instrument, debug, info, warn};

use crate::compute::{BatchTransform, ComputePool};
use crate::concurrency::channel::BoundedRx;
use crate::concurrency::future::PendingUnit;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::concurrency::stream::BatchStream;
use crate::conveyor_error;
use crate::error::{ConveyorResult, ErrorKind};
use crate::resilience::retry::{RetryPolicy, retry_with_policy};
use crate::sink::Sink;
use crate::types::{BatchId, PipelineId, Record, RecordBatch};

/// Progress counters of the dispatch worker.
///
/// Counters are snapshots: they advance while the worker runs and freeze at
/// their final values when it stops.
#[derive(Debug, Clone, Default)]
pub struct DispatchWorkerState {
    batches_dispatched: Arc<AtomicU64>,
    records_forwarded: Arc<AtomicU64>,
}

impl DispatchWorkerState {
    /// Returns how many batches were submitted to the compute pool.
    pub fn batches_dispatched(&self) -> u64 {
        self.batches_dispatched.load(Ordering::Relaxed)
    }

    /// Returns how many records were forwarded to the sink.
    pub fn records_forwarded(&self) -> u64 {
        self.records_forwarded.load(Ordering::Relaxed)
    }

    fn note_batch(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    fn note_forwarded(&self, records: u64) {
        self.records_forwarded.fetch_add(records, Ordering::Relaxed);
    }
}

/// Handle for monitoring and joining the dispatch worker.
#[derive(Debug)]
pub struct DispatchWorkerHandle {
    state: DispatchWorkerState,
    handle: Option<JoinHandle<ConveyorResult<()>>>,
}

impl crate::workers::base::WorkerHandle<DispatchWorkerState> for DispatchWorkerHandle {
    fn state(&self) -> DispatchWorkerState {
        self.state.clone()
    }

    async fn wait(mut self) -> ConveyorResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            if err.is_cancelled() {
                conveyor_error!(
                    ErrorKind::OperationCanceled,
                    "Dispatch worker was cancelled",
                    err
                )
            } else {
                conveyor_error!(
                    ErrorKind::DispatchWorkerPanic,
                    "Dispatch worker panicked",
                    err
                )
            }
        })??;

        Ok(())
    }
}

/// Worker bridging the cooperative ingestion side into the parallel compute
/// domain.
///
/// The dispatch worker consumes the bounded channel, groups consecutive
/// records into batches, stamps each batch with a monotonically increasing
/// id, and submits it to the compute pool without blocking on the result.
/// Completed batches are forwarded to the sink strictly in ascending batch id
/// order, regardless of the order in which workers finish them.
///
/// The number of outstanding submissions is bounded by a window derived from
/// the pool size; beyond it the worker stops consuming input until the oldest
/// batch completes, which propagates backpressure through the channel to the
/// ingest side.
pub struct DispatchWorker<T, K> {
    pipeline_id: PipelineId,
    config: Arc<PipelineConfig>,
    input: BoundedRx<Record>,
    compute: ComputePool,
    transform: Arc<T>,
    sink: K,
    shutdown_rx: ShutdownRx,
}

impl<T, K> DispatchWorker<T, K>
where
    T: BatchTransform,
    K: Sink + Send + Sync + 'static,
{
    /// Creates a new dispatch worker reading from `input`.
    pub fn new(
        pipeline_id: PipelineId,
        config: Arc<PipelineConfig>,
        input: BoundedRx<Record>,
        compute: ComputePool,
        transform: Arc<T>,
        sink: K,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            pipeline_id,
            config,
            input,
            compute,
            transform,
            sink,
            shutdown_rx,
        }
    }
}

impl<T, K> crate::workers::base::Worker<DispatchWorkerHandle, DispatchWorkerState>
    for DispatchWorker<T, K>
where
    T: BatchTransform,
    K: Sink + Send + Sync + 'static,
{
    type Error = crate::error::ConveyorError;

    async fn start(self) -> Result<DispatchWorkerHandle, Self::Error> {
        info!("starting dispatch worker");

        let state = DispatchWorkerState::default();

        let span = tracing::info_span!(
            "dispatch_worker",
            pipeline_id = self.pipeline_id,
            transform = self.transform.name(),
            sink = K::name()
        );
        let worker_state = state.clone();
        let worker = run(
            self.config,
            self.input,
            self.compute,
            self.transform,
            self.sink,
            self.shutdown_rx,
            worker_state,
        )
        .instrument(span.or_current());

        let handle = tokio::spawn(worker);

        Ok(DispatchWorkerHandle {
            state,
            handle: Some(handle),
        })
    }
}

/// A submitted batch awaiting its result.
///
/// The input records are retained so a transiently failed batch can be
/// resubmitted whole.
struct InFlight {
    batch: RecordBatch,
    unit: PendingUnit<RecordBatch>,
}

/// One turn of the dispatch loop.
enum Step {
    /// The oldest outstanding batch finished.
    Finished(ConveyorResult<RecordBatch>),
    /// The batch stream produced its next item (or ended).
    Input(Option<ShutdownResult<Vec<Record>, Vec<Record>>>),
}

async fn run<T, K>(
    config: Arc<PipelineConfig>,
    input: BoundedRx<Record>,
    compute: ComputePool,
    transform: Arc<T>,
    sink: K,
    shutdown_rx: ShutdownRx,
    state: DispatchWorkerState,
) -> ConveyorResult<()>
where
    T: BatchTransform,
    K: Sink + Send + Sync + 'static,
{
    let retry_policy = RetryPolicy::from_config(&config.retry);
    let max_in_flight = compute.worker_count().saturating_mul(2).max(1);

    let mut stream = Box::pin(BatchStream::wrap(input, config.batch.clone(), shutdown_rx));
    let mut in_flight: VecDeque<InFlight> = VecDeque::new();
    let mut next_batch_id: BatchId = 0;
    let mut stopping = false;

    loop {
        // With units outstanding, finishing the oldest one races against
        // pulling more input so completed batches reach the sink promptly
        // even when the record stream goes quiet.
        let step = match in_flight.front_mut() {
            Some(front) => {
                tokio::select! {
                    result = &mut front.unit => Step::Finished(result),
                    next = stream.next() => Step::Input(next),
                }
            }
            None => Step::Input(stream.next().await),
        };

        match step {
            Step::Finished(result) => {
                let finished = in_flight
                    .pop_front()
                    .expect("front unit resolved, queue cannot be empty");

                emit_resolved(
                    &retry_policy,
                    &compute,
                    &transform,
                    &sink,
                    &state,
                    finished.batch,
                    result,
                )
                .await?;
            }
            Step::Input(None) => break,
            Step::Input(Some(item)) => {
                let (records, shutdown) = match item {
                    ShutdownResult::Ok(records) => (records, false),
                    ShutdownResult::Shutdown(records) => (records, true),
                };

                if !records.is_empty() {
                    let batch = RecordBatch::new(next_batch_id, records);
                    next_batch_id += 1;

                    debug!(
                        batch_id = batch.id(),
                        records = batch.len(),
                        "submitting batch to compute pool"
                    );

                    let unit = compute.submit(transform.clone(), batch.clone());
                    in_flight.push_back(InFlight { batch, unit });
                    state.note_batch();
                }

                if shutdown {
                    stopping = true;
                    break;
                }

                // Bound outstanding submissions; waiting on the oldest here
                // is what pushes back on the channel once the window fills.
                while in_flight.len() >= max_in_flight {
                    let InFlight { batch, mut unit } = in_flight
                        .pop_front()
                        .expect("in-flight window is non-empty");
                    let result = (&mut unit).await;

                    emit_resolved(
                        &retry_policy,
                        &compute,
                        &transform,
                        &sink,
                        &state,
                        batch,
                        result,
                    )
                    .await?;
                }
            }
        }
    }

    // Drain every outstanding unit, oldest first, so output order matches
    // submission order to the very end.
    while let Some(InFlight { batch, mut unit }) = in_flight.pop_front() {
        let result = (&mut unit).await;
        emit_resolved(
            &retry_policy,
            &compute,
            &transform,
            &sink,
            &state,
            batch,
            result,
        )
        .await?;
    }

    if stopping {
        info!("dispatch worker stopped on shutdown signal");
    } else {
        info!(
            batches_dispatched = state.batches_dispatched(),
            records_forwarded = state.records_forwarded(),
            "dispatch worker drained its input"
        );
    }

    Ok(())
}

/// Forwards one resolved batch to the sink, retrying the whole batch when
/// its failure was transient.
async fn emit_resolved<T, K>(
    retry_policy: &RetryPolicy,
    compute: &ComputePool,
    transform: &Arc<T>,
    sink: &K,
    state: &DispatchWorkerState,
    batch: RecordBatch,
    result: ConveyorResult<RecordBatch>,
) -> ConveyorResult<()>
where
    T: BatchTransform,
    K: Sink + Send + Sync + 'static,
{
    let output = match result {
        Ok(output) => output,
        Err(err) if err.is_transient() && retry_policy.max_attempts > 1 => {
            warn!(
                batch_id = batch.id(),
                error = %err,
                "batch failed transiently, resubmitting whole batch"
            );

            // The first attempt already failed, so back off before the
            // first resubmission and leave the remaining attempts to the
            // retry wrapper.
            sleep(retry_policy.backoff_delay(0)).await;

            let remaining = RetryPolicy {
                max_attempts: retry_policy.max_attempts - 1,
                ..*retry_policy
            };
            retry_with_policy(&remaining, "batch resubmission", || {
                compute.submit(transform.clone(), batch.clone())
            })
            .await?
        }
        Err(err) => return Err(err),
    };

    let records = output.into_records();
    state.note_forwarded(records.len() as u64);

    retry_with_policy(retry_policy, "sink write", || {
        sink.write_batch(records.clone())
    })
    .await
}
