//! Bounded channel between the ingest and dispatch sides of the pipeline.
//!
//! The channel holds at most `capacity` items. [`BoundedTx::put`] suspends
//! its caller while the channel is full and [`BoundedRx::get`] suspends while
//! it is empty, which makes the channel the sole mechanism preventing a fast
//! producer side from out-running a slower consumer side. No unbounded
//! buffering exists anywhere in the core.
//!
//! End of stream is signalled by closing: dropping the last [`BoundedTx`]
//! clone closes the channel, and every consumer observes the close once the
//! buffered items are drained. This is the close-count form of end-of-stream
//! propagation, so no consumer can block forever on data that will never
//! arrive.

use core::pin::Pin;
use core::task::{Context, Poll};
use futures::Stream;
use tokio::sync::mpsc;

/// Producer handle of a bounded channel.
#[derive(Debug)]
pub struct BoundedTx<T>(mpsc::Sender<T>);

impl<T> Clone for BoundedTx<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> BoundedTx<T> {
    /// Enqueues an item, suspending while the channel is at capacity.
    ///
    /// Fails only when the receiver side is gone; the item is returned inside
    /// the error so no data is silently dropped.
    pub async fn put(&self, item: T) -> Result<(), mpsc::error::SendError<T>> {
        self.0.send(item).await
    }

    /// Returns the configured capacity of the channel.
    pub fn max_capacity(&self) -> usize {
        self.0.max_capacity()
    }
}

/// Consumer handle of a bounded channel.
#[derive(Debug)]
pub struct BoundedRx<T>(mpsc::Receiver<T>);

impl<T> BoundedRx<T> {
    /// Dequeues the next item, suspending while the channel is empty.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub async fn get(&mut self) -> Option<T> {
        self.0.recv().await
    }

    /// Closes the receiving side.
    ///
    /// Pending and future `put` calls fail, which unblocks producers waiting
    /// on a full channel.
    pub fn close(&mut self) {
        self.0.close();
    }
}

impl<T> Stream for BoundedRx<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.poll_recv(cx)
    }
}

/// Creates a bounded channel with the given capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero; configuration validation rejects that value
/// before a pipeline is built.
pub fn bounded_channel<T>(capacity: usize) -> (BoundedTx<T>, BoundedRx<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (BoundedTx(tx), BoundedRx(rx))
}
