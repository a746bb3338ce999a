use conveyor_config::shared::BatchConfig;
use core::pin::Pin;
use core::task::{Context, Poll};
use futures::{Future, Stream, ready};
use pin_project_lite::pin_project;
use std::time::Duration;
use tracing::info;

use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};

pin_project! {
    /// A stream adapter that groups items into batches.
    ///
    /// Items are collected from the underlying stream into batches that are
    /// emitted when one of three things happens:
    /// - the batch reaches `max_size` records,
    /// - `max_fill_ms` elapses with a non-empty partial batch,
    /// - shutdown is signalled, in which case whatever is buffered is
    ///   flushed with a shutdown marker.
    ///
    /// Batch membership is arrival order and nothing else; the final batch
    /// before end of stream may be smaller than `max_size`.
    #[must_use = "streams do nothing unless polled"]
    #[derive(Debug)]
    pub struct BatchStream<B, S: Stream<Item = B>> {
        #[pin]
        stream: S,
        #[pin]
        deadline: Option<tokio::time::Sleep>,
        shutdown_rx: ShutdownRx,
        items: Vec<S::Item>,
        batch_config: BatchConfig,
        reset_timer: bool,
        inner_stream_ended: bool,
        stream_stopped: bool,
    }
}

impl<B, S: Stream<Item = B>> BatchStream<B, S> {
    /// Creates a new [`BatchStream`] wrapping `stream`.
    pub fn wrap(stream: S, batch_config: BatchConfig, shutdown_rx: ShutdownRx) -> Self {
        BatchStream {
            stream,
            deadline: None,
            shutdown_rx,
            items: Vec::with_capacity(batch_config.max_size),
            batch_config,
            reset_timer: true,
            inner_stream_ended: false,
            stream_stopped: false,
        }
    }
}

impl<B, S: Stream<Item = B>> Stream for BatchStream<B, S> {
    type Item = ShutdownResult<Vec<S::Item>, Vec<S::Item>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.as_mut().project();

        if *this.inner_stream_ended {
            return Poll::Ready(None);
        }

        loop {
            if *this.stream_stopped {
                return Poll::Ready(None);
            }

            // Shutdown wins over everything else. The buffered items are
            // handed back with a shutdown marker so the caller can flush
            // them; even an empty batch is returned to make the shutdown
            // observable.
            if this.shutdown_rx.has_changed().unwrap_or(false) {
                info!("batch stream stopping on shutdown signal");

                *this.stream_stopped = true;
                this.shutdown_rx.mark_unchanged();

                return Poll::Ready(Some(ShutdownResult::Shutdown(std::mem::take(this.items))));
            }

            // Arm the flush timer at the start of every batch.
            if *this.reset_timer {
                this.deadline
                    .set(Some(tokio::time::sleep(Duration::from_millis(
                        this.batch_config.max_fill_ms,
                    ))));
                *this.reset_timer = false;
            }

            if this.items.is_empty() {
                this.items.reserve_exact(this.batch_config.max_size);
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Pending => break,
                Poll::Ready(Some(item)) => {
                    this.items.push(item);

                    if this.items.len() >= this.batch_config.max_size {
                        *this.reset_timer = true;
                        return Poll::Ready(Some(ShutdownResult::Ok(std::mem::take(this.items))));
                    }
                }
                Poll::Ready(None) => {
                    // Underlying stream finished: emit the final partial
                    // batch if there is one, then end.
                    let last = if this.items.is_empty() {
                        None
                    } else {
                        *this.reset_timer = true;
                        Some(ShutdownResult::Ok(std::mem::take(this.items)))
                    };

                    *this.inner_stream_ended = true;

                    return Poll::Ready(last);
                }
            }
        }

        // No items arrived right now. Flush the partial batch once the
        // timer expires so a quiet stream still has bounded latency.
        if !this.items.is_empty()
            && let Some(deadline) = this.deadline.as_pin_mut()
        {
            ready!(deadline.poll(cx));
            *this.reset_timer = true;

            return Poll::Ready(Some(ShutdownResult::Ok(std::mem::take(this.items))));
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use futures::StreamExt;
    use futures::future::poll_fn;
    use pin_project_lite::pin_project;

    fn batch_config(max_size: usize, max_fill_ms: u64) -> BatchConfig {
        BatchConfig {
            max_size,
            max_fill_ms,
        }
    }

    pin_project! {
        struct TwoThenPending {
            emitted: usize,
        }
    }

    impl Stream for TwoThenPending {
        type Item = i32;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            match self.emitted {
                0 => {
                    self.emitted = 1;
                    Poll::Ready(Some(1))
                }
                1 => {
                    self.emitted = 2;
                    Poll::Ready(Some(2))
                }
                _ => Poll::Pending,
            }
        }
    }

    #[tokio::test]
    async fn batches_by_size_with_smaller_final_batch() {
        let (_, shutdown_rx) = create_shutdown_channel();
        let mut stream = Box::pin(BatchStream::wrap(
            futures::stream::iter(1..=5),
            batch_config(2, 10_000),
            shutdown_rx,
        ));

        assert_eq!(
            stream.next().await,
            Some(ShutdownResult::Ok(vec![1, 2]))
        );
        assert_eq!(
            stream.next().await,
            Some(ShutdownResult::Ok(vec![3, 4]))
        );
        assert_eq!(stream.next().await, Some(ShutdownResult::Ok(vec![5])));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn flushes_partial_batch_when_timer_expires() {
        let (_, shutdown_rx) = create_shutdown_channel();
        let mut stream = Box::pin(BatchStream::wrap(
            TwoThenPending { emitted: 0 },
            batch_config(10, 20),
            shutdown_rx,
        ));

        // Only two of ten items ever arrive; the flush timer must hand them
        // over instead of waiting for a full batch.
        assert_eq!(
            stream.next().await,
            Some(ShutdownResult::Ok(vec![1, 2]))
        );
    }

    #[tokio::test]
    async fn shutdown_flushes_buffered_items() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let mut stream = Box::pin(BatchStream::wrap(
            TwoThenPending { emitted: 0 },
            batch_config(10, 60_000),
            shutdown_rx,
        ));

        // First poll buffers the two available items and stays pending.
        poll_fn(|cx| match stream.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Ready(()),
            _ => panic!("expected pending while batch fills"),
        })
        .await;

        shutdown_tx.shutdown().unwrap();

        let batch = poll_fn(|cx| stream.as_mut().poll_next(cx)).await;
        assert_eq!(batch, Some(ShutdownResult::Shutdown(vec![1, 2])));
        assert_eq!(stream.next().await, None);
    }
}
