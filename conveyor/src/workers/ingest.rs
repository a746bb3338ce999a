use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;
use tracing::{Instrument, info, warn};

use crate::concurrency::channel::BoundedTx;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::ConveyorResult;
use crate::resilience::retry::{RetryPolicy, retry_with_policy};
use crate::source::Source;
use crate::types::{PipelineId, Record, SourceId};

/// Lifecycle phase of an ingest worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// The worker is reading records from its source.
    Running,
    /// The source was drained (or shutdown was observed) and the worker
    /// stopped cleanly.
    Finished,
    /// The worker stopped because of an unrecoverable error.
    Errored,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestPhase::Running => write!(f, "running"),
            IngestPhase::Finished => write!(f, "finished"),
            IngestPhase::Errored => write!(f, "errored"),
        }
    }
}

/// Internal state of [`IngestWorkerState`].
#[derive(Debug)]
struct IngestWorkerStateInner {
    source_id: SourceId,
    phase: IngestPhase,
    records_emitted: u64,
    /// Wakes tasks waiting on a phase change. Only active listeners are
    /// woken; no permit is stored for future waiters.
    phase_change: Arc<Notify>,
}

impl IngestWorkerStateInner {
    fn set_phase(&mut self, phase: IngestPhase) {
        info!(
            source_id = %self.source_id,
            from_phase = %self.phase,
            to_phase = %phase,
            "ingest worker phase changing",
        );

        self.phase = phase;
        self.phase_change.notify_waiters();
    }
}

/// Shareable handle onto one ingest worker's progress.
///
/// Used by the pool to report on active workers and by tests to wait for a
/// worker to reach a phase without polling.
#[derive(Debug, Clone)]
pub struct IngestWorkerState {
    inner: Arc<Mutex<IngestWorkerStateInner>>,
}

impl IngestWorkerState {
    fn new(source_id: SourceId) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IngestWorkerStateInner {
                source_id,
                phase: IngestPhase::Running,
                records_emitted: 0,
                phase_change: Arc::new(Notify::new()),
            })),
        }
    }

    /// Returns the current lifecycle phase.
    pub async fn phase(&self) -> IngestPhase {
        self.inner.lock().await.phase
    }

    /// Returns how many records this worker has emitted so far.
    pub async fn records_emitted(&self) -> u64 {
        self.inner.lock().await.records_emitted
    }

    /// Suspends until the worker reaches the given phase.
    pub async fn wait_for_phase(&self, target: IngestPhase) {
        loop {
            let notify = {
                let inner = self.inner.lock().await;
                if inner.phase == target {
                    return;
                }
                inner.phase_change.clone()
            };

            // Register interest before re-checking so a transition between
            // the check and the wait cannot be missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.lock().await.phase == target {
                return;
            }

            notified.await;
        }
    }

    async fn set_phase(&self, phase: IngestPhase) {
        self.inner.lock().await.set_phase(phase);
    }

    async fn record_emitted(&self) {
        self.inner.lock().await.records_emitted += 1;
    }
}

/// Handle held by the worker pool for one spawned ingest worker.
#[derive(Debug)]
pub struct IngestWorkerHandle {
    state: IngestWorkerState,
    abort_handle: AbortHandle,
}

impl IngestWorkerHandle {
    pub(crate) fn new(state: IngestWorkerState, abort_handle: AbortHandle) -> Self {
        Self {
            state,
            abort_handle,
        }
    }

    /// Returns the state handle of this worker.
    pub fn state(&self) -> IngestWorkerState {
        self.state.clone()
    }

    /// Returns `true` once the worker's task has finished, for any outcome.
    pub fn is_finished(&self) -> bool {
        self.abort_handle.is_finished()
    }
}

/// Worker that drives a single [`Source`] and feeds the bounded channel.
///
/// One ingest worker exists per source, so the source needs no internal
/// synchronization and its record order is preserved end-to-end. Transient
/// read failures are absorbed by the retry wrapper up to the configured
/// attempt limit; an unrecoverable failure stops this worker only, leaving
/// its siblings untouched.
pub struct IngestWorker<S> {
    source: S,
    output: BoundedTx<Record>,
    retry_policy: RetryPolicy,
    shutdown_rx: ShutdownRx,
}

impl<S> IngestWorker<S>
where
    S: Source + Send + 'static,
{
    /// Creates a new ingest worker for `source`.
    pub fn new(
        source: S,
        output: BoundedTx<Record>,
        retry_policy: RetryPolicy,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            source,
            output,
            retry_policy,
            shutdown_rx,
        }
    }

    /// Splits the worker into its state handle and the future that runs it.
    ///
    /// The future is handed to the pool, which owns the spawned task; the
    /// state handle stays observable through the pool.
    pub fn prepare(
        self,
        pipeline_id: PipelineId,
    ) -> (IngestWorkerState, impl Future<Output = ConveyorResult<()>> + Send) {
        let source_id = self.source.source_id();
        let state = IngestWorkerState::new(source_id);

        let span = tracing::info_span!(
            "ingest_worker",
            pipeline_id,
            source_id = %source_id,
        );

        let worker_state = state.clone();
        let future = run(
            self.source,
            self.output,
            self.retry_policy,
            self.shutdown_rx,
            worker_state,
        )
        .instrument(span.or_current());

        (state, future)
    }
}

async fn run<S>(
    mut source: S,
    output: BoundedTx<Record>,
    retry_policy: RetryPolicy,
    mut shutdown_rx: ShutdownRx,
    state: IngestWorkerState,
) -> ConveyorResult<()>
where
    S: Source + Send,
{
    info!("starting ingest worker");

    let result = ingest_loop(&mut source, &output, &retry_policy, &mut shutdown_rx, &state).await;

    // The source is closed exactly once, however the loop ended.
    if let Err(close_err) = source.close().await {
        warn!(error = %close_err, "failed to close source cleanly");
    }

    match result {
        Ok(()) => {
            state.set_phase(IngestPhase::Finished).await;
            let records_emitted = state.records_emitted().await;
            info!(records_emitted, "ingest worker completed");
            Ok(())
        }
        Err(err) => {
            state.set_phase(IngestPhase::Errored).await;
            Err(err)
        }
    }
}

async fn ingest_loop<S>(
    source: &mut S,
    output: &BoundedTx<Record>,
    retry_policy: &RetryPolicy,
    shutdown_rx: &mut ShutdownRx,
    state: &IngestWorkerState,
) -> ConveyorResult<()>
where
    S: Source + Send,
{
    loop {
        let next = tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("ingest worker stopping on shutdown signal");
                return Ok(());
            }
            next = retry_with_policy(retry_policy, "source read", async || {
                source.next_record().await
            }) => next,
        };

        match next {
            Ok(Some(record)) => {
                let put = tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("ingest worker stopping on shutdown signal");
                        return Ok(());
                    }
                    put = output.put(record) => put,
                };

                if put.is_err() {
                    // The receiving side is gone, which means the dispatch
                    // worker stopped; whatever stopped it is reported there,
                    // so this worker just winds down quietly.
                    info!("output channel closed, stopping source early");
                    return Ok(());
                }

                state.record_emitted().await;
            }
            Ok(None) => {
                info!("source exhausted");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    }
}
