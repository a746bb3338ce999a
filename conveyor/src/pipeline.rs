use conveyor_config::shared::PipelineConfig;
use std::sync::Arc;
use tracing::{error, info};

use crate::bail;
use crate::compute::{BatchTransform, ComputePool};
use crate::concurrency::channel::bounded_channel;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ConveyorResult, ErrorKind};
use crate::resilience::retry::RetryPolicy;
use crate::sink::Sink;
use crate::source::Source;
use crate::types::PipelineId;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::dispatch::{DispatchWorker, DispatchWorkerHandle};
use crate::workers::ingest::IngestWorker;
use crate::workers::pool::IngestWorkerPool;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        ingest_pool: IngestWorkerPool,
        dispatch_worker: DispatchWorkerHandle,
    },
}

/// A running ingestion-to-computation bridge.
///
/// The pipeline wires sources → ingest workers → bounded channel → dispatch
/// worker → compute pool → sink, with retries around every fallible call.
/// Sources run concurrently on the cooperative side; batch transforms run in
/// parallel on the compute pool; the bounded channel in between is the only
/// buffering point and the mechanism that matches the two rates.
#[derive(Debug)]
pub struct Pipeline<S, T, K> {
    id: PipelineId,
    config: Arc<PipelineConfig>,
    sources: Vec<S>,
    transform: Arc<T>,
    sink: Option<K>,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<S, T, K> Pipeline<S, T, K>
where
    S: Source + Send + 'static,
    T: BatchTransform,
    K: Sink + Send + Sync + 'static,
{
    /// Creates a new pipeline in the not-started state.
    pub fn new(
        id: PipelineId,
        config: PipelineConfig,
        sources: Vec<S>,
        transform: T,
        sink: K,
    ) -> Self {
        // The receiver half is dropped here; every worker gets its own
        // subscription from the transmitter when the pipeline starts.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            id,
            config: Arc::new(config),
            sources,
            transform: Arc::new(transform),
            sink: Some(sink),
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    /// Returns the id of this pipeline.
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Returns a handle that can request shutdown from elsewhere.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Starts every worker of the pipeline.
    ///
    /// Validates the configuration, spawns one ingest worker per source and
    /// the dispatch worker, and transitions into the started state. Returns
    /// as soon as everything is running.
    pub async fn start(&mut self) -> ConveyorResult<()> {
        info!(
            "starting pipeline {} with {} sources",
            self.id,
            self.sources.len()
        );

        if matches!(self.state, PipelineState::Started { .. }) {
            bail!(ErrorKind::InvalidState, "Pipeline was already started");
        }

        if let Err(err) = self.config.validate() {
            bail!(
                ErrorKind::ConfigError,
                "Invalid pipeline configuration",
                err
            );
        }

        let Some(sink) = self.sink.take() else {
            bail!(ErrorKind::InvalidState, "Pipeline sink was already consumed");
        };

        let (record_tx, record_rx) = bounded_channel(self.config.channel_capacity);
        let retry_policy = RetryPolicy::from_config(&self.config.retry);

        // One ingest worker per source, all owned by the pool.
        let ingest_pool = IngestWorkerPool::new();
        {
            let mut pool = ingest_pool.lock().await;
            for source in self.sources.drain(..) {
                let source_id = source.source_id();
                let worker = IngestWorker::new(
                    source,
                    record_tx.clone(),
                    retry_policy,
                    self.shutdown_tx.subscribe(),
                );
                let (state, future) = worker.prepare(self.id);
                pool.spawn(source_id, state, future);
            }
        }

        // The workers hold the only remaining transmitters. Once the last
        // one stops, the channel closes and the dispatch worker drains out.
        drop(record_tx);

        let compute = ComputePool::new(self.config.max_compute_workers as usize);

        let dispatch_worker = DispatchWorker::new(
            self.id,
            self.config.clone(),
            record_rx,
            compute,
            self.transform.clone(),
            sink,
            self.shutdown_tx.subscribe(),
        )
        .start()
        .await?;

        self.state = PipelineState::Started {
            ingest_pool,
            dispatch_worker,
        };

        Ok(())
    }

    /// Waits for the pipeline to finish.
    ///
    /// Ingest workers are joined first: their completion closes the channel,
    /// which lets the dispatch worker drain its remaining batches and stop.
    /// Errors from both sides are collected and returned together; a failure
    /// on one side never prevents joining the other.
    pub async fn wait(self) -> ConveyorResult<()> {
        let PipelineState::Started {
            ingest_pool,
            dispatch_worker,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        let mut errors = vec![];

        info!("waiting for ingest workers to complete");

        if let Err(err) = ingest_pool.wait_all().await {
            let errors_number = err.kinds().len();
            errors.push(err);

            info!("{} ingest workers failed with an error", errors_number);
        }

        info!("waiting for dispatch worker to complete");

        // A dispatch failure needs no extra coordination with the ingest
        // side: dropping the channel receiver already made every pending
        // put fail, which stopped the ingest workers above.
        if let Err(err) = dispatch_worker.wait().await {
            errors.push(err);
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(())
    }

    /// Requests a graceful stop of every worker.
    ///
    /// Workers observe the signal at their next suspension point; buffered
    /// records are flushed and in-flight batches complete before the
    /// pipeline stops.
    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!("failed to send shutdown signal to the pipeline: {}", err);
            return;
        }

        info!("shutdown signal successfully sent to all workers");
    }

    /// Requests shutdown and waits for every worker to stop.
    pub async fn shutdown_and_wait(self) -> ConveyorResult<()> {
        self.shutdown();
        self.wait().await
    }
}
