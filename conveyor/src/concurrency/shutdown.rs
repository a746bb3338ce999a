//! Broadcast shutdown signaling for cooperative workers.
//!
//! A single [`ShutdownTx`] notifies any number of [`ShutdownRx`] subscribers
//! that the pipeline should stop. Workers observe the signal at their next
//! suspension point, finish or flush their current unit of work, and return.
//! Cancellation is never preemptive: a worker that is mid-computation
//! completes that computation first.

use tokio::sync::watch;

/// Transmitter side of the shutdown broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Broadcasts the shutdown signal to all subscribers.
    ///
    /// Fails if no subscriber is alive anymore, which callers may safely
    /// ignore: it means every worker has already stopped.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new shutdown receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiver side of the shutdown broadcast channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Creates a new shutdown broadcast channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Outcome of an operation that may be interrupted by shutdown.
///
/// `Ok` carries the regular result; `Shutdown` carries whatever partial state
/// the operation held when the signal arrived, so callers can flush it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult<T, S> {
    Ok(T),
    Shutdown(S),
}
