use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::conveyor_error;
use crate::error::{ConveyorResult, ErrorKind};
use crate::types::SourceId;
use crate::workers::ingest::{IngestWorkerHandle, IngestWorkerState};

/// Internal state for [`IngestWorkerPool`].
#[derive(Debug)]
pub struct IngestWorkerPoolInner {
    /// Currently active ingest workers indexed by source id.
    active: HashMap<SourceId, IngestWorkerHandle>,
    /// Owns all spawned worker tasks.
    join_set: JoinSet<(SourceId, ConveyorResult<()>)>,
}

impl IngestWorkerPoolInner {
    fn new() -> Self {
        Self {
            active: HashMap::new(),
            join_set: JoinSet::new(),
        }
    }

    /// Spawns and inserts a worker into the pool.
    ///
    /// If a worker for the source already exists and is still running, logs
    /// a warning and skips insertion: one source is driven by exactly one
    /// worker.
    pub fn spawn<F>(&mut self, source_id: SourceId, state: IngestWorkerState, future: F)
    where
        F: Future<Output = ConveyorResult<()>> + Send + 'static,
    {
        match self.active.entry(source_id) {
            Entry::Vacant(entry) => {
                let abort_handle = self.join_set.spawn(async move {
                    let result = future.await;
                    (source_id, result)
                });

                entry.insert(IngestWorkerHandle::new(state, abort_handle));

                debug!(%source_id, "spawned ingest worker in pool");
            }
            Entry::Occupied(entry) => {
                if entry.get().is_finished() {
                    let abort_handle = self.join_set.spawn(async move {
                        let result = future.await;
                        (source_id, result)
                    });

                    entry.remove();
                    self.active
                        .insert(source_id, IngestWorkerHandle::new(state, abort_handle));

                    debug!(%source_id, "replaced finished ingest worker in pool");
                } else {
                    warn!(%source_id, "ingest worker already exists in pool and is still running");
                }
            }
        }
    }

    /// Retrieves the state handle of an active worker by source id.
    ///
    /// Returns `None` if no worker exists for the source or if the worker
    /// has finished.
    pub fn get_active_worker_state(&self, source_id: SourceId) -> Option<IngestWorkerState> {
        let handle = self.active.get(&source_id)?;

        if handle.is_finished() {
            return None;
        }

        Some(handle.state())
    }

    /// Checks if an active worker exists for the given source.
    pub fn has_active_worker(&self, source_id: SourceId) -> bool {
        self.active
            .get(&source_id)
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Pool owning all ingest workers of one pipeline.
///
/// The pool is the cooperative scheduler of the ingestion side: it runs one
/// worker per source concurrently, isolates their failures from each other,
/// and aggregates every failure into a single error when waiting for
/// completion.
#[derive(Debug, Clone)]
pub struct IngestWorkerPool {
    inner: Arc<Mutex<IngestWorkerPoolInner>>,
}

impl IngestWorkerPool {
    /// Creates a new empty ingest worker pool.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(IngestWorkerPoolInner::new())),
        }
    }

    /// Waits for all active ingest workers to complete.
    ///
    /// A failed worker never halts its siblings; its error is collected and
    /// the wait continues. All collected errors are returned together once
    /// every worker has stopped.
    pub async fn wait_all(&self) -> ConveyorResult<()> {
        let mut errors = Vec::new();

        loop {
            let result = {
                let mut inner = self.inner.lock().await;
                inner.join_set.join_next().await
            };

            let Some(result) = result else {
                // JoinSet is empty, all workers have completed.
                break;
            };

            match result {
                Ok((source_id, worker_result)) => {
                    let mut inner = self.inner.lock().await;
                    inner.active.remove(&source_id);

                    if let Err(err) = worker_result {
                        error!(%source_id, error = %err, "ingest worker completed with error");
                        errors.push(err);
                    }
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("ingest worker task was cancelled");
                    } else {
                        errors.push(conveyor_error!(
                            ErrorKind::IngestWorkerPanic,
                            "Ingest worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        // Drop any stale entries left in the active map.
        {
            let mut inner = self.inner.lock().await;
            inner.active.clear();
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.into())
        }
    }
}

impl Default for IngestWorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for IngestWorkerPool {
    type Target = Mutex<IngestWorkerPoolInner>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
