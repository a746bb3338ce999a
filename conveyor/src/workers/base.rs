use std::future::Future;

use crate::error::ConveyorResult;

/// Trait for background workers of the pipeline.
///
/// A [`Worker`] owns everything it needs before it starts; starting consumes
/// it and hands back a handle. The generic parameter `H` is the handle type
/// and `S` the state type observable through that handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when worker startup fails.
    type Error;

    /// Starts the worker and returns a handle for monitoring its execution.
    ///
    /// Returns as soon as the background task is launched; the worker then
    /// runs until its input ends, shutdown is signalled, or it fails.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle for monitoring and controlling a running worker.
///
/// The generic parameter `S` is the state type observable through this
/// handle. The state is a snapshot: holding it neither keeps the worker
/// alive nor guarantees anything about its current status.
pub trait WorkerHandle<S> {
    /// Returns the current state of the worker.
    fn state(&self) -> S;

    /// Waits for the worker to complete and returns its final result.
    ///
    /// Consumes the handle. A worker that panicked or was aborted reports
    /// that through the returned error rather than propagating the panic.
    fn wait(self) -> impl Future<Output = ConveyorResult<()>> + Send;
}
