//! Awaitable handles for work submitted to the compute pool.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, ready};
use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::conveyor_error;
use crate::error::{ConveyorResult, ErrorKind};

pin_project! {
    /// Handle for a single in-flight computation.
    ///
    /// A [`PendingUnit`] is in exactly one of three states: pending,
    /// succeeded, or failed. Transitions are monotonic by construction: the
    /// result arrives over a oneshot channel, which delivers at most one
    /// value, and once the unit resolved it never changes again.
    ///
    /// Awaiting the unit suspends the caller without blocking the runtime,
    /// so the cooperative side keeps making progress while the computation
    /// runs in the parallel domain.
    #[must_use = "a pending unit does nothing unless awaited"]
    #[derive(Debug)]
    pub struct PendingUnit<T> {
        #[pin]
        rx: oneshot::Receiver<ConveyorResult<T>>,
        abort: AbortHandle,
        cancelled: bool,
    }
}

impl<T> PendingUnit<T> {
    pub(crate) fn new(rx: oneshot::Receiver<ConveyorResult<T>>, abort: AbortHandle) -> Self {
        Self {
            rx,
            abort,
            cancelled: false,
        }
    }

    /// Cancels the submission at the bridge layer.
    ///
    /// If the computation has not started yet it will never run. If it is
    /// already running it completes on its worker, but the result is
    /// discarded and awaiting this unit yields a cancellation error.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.abort.abort();
    }

    /// Returns `true` once the backing submission has finished, for any
    /// outcome.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

impl<T> Future for PendingUnit<T> {
    type Output = ConveyorResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match ready!(this.rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            // The sender was dropped without delivering a result: either the
            // submission was cancelled or its driver task died.
            Err(_) if *this.cancelled => Poll::Ready(Err(conveyor_error!(
                ErrorKind::OperationCanceled,
                "Batch submission was cancelled"
            ))),
            Err(_) => Poll::Ready(Err(conveyor_error!(
                ErrorKind::ComputeWorkerPanic,
                "Batch submission died without delivering a result"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn unit_from_task<T, F>(task: F) -> PendingUnit<T>
    where
        T: Send + 'static,
        F: Future<Output = ConveyorResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
        PendingUnit::new(rx, handle.abort_handle())
    }

    #[tokio::test]
    async fn resolves_with_the_task_result() {
        let unit = unit_from_task(async { Ok(21) });
        assert_eq!(unit.await.unwrap(), 21);
    }

    #[tokio::test]
    async fn propagates_task_errors() {
        let unit = unit_from_task::<i32, _>(async {
            Err(conveyor_error!(ErrorKind::TransformFailed, "boom"))
        });
        assert_eq!(unit.await.unwrap_err().kind(), ErrorKind::TransformFailed);
    }

    #[tokio::test]
    async fn cancel_resolves_to_cancellation_error() {
        let mut unit = unit_from_task(async {
            sleep(Duration::from_secs(60)).await;
            Ok(1)
        });

        assert!(!unit.is_finished());
        unit.cancel();

        assert_eq!(unit.await.unwrap_err().kind(), ErrorKind::OperationCanceled);
    }
}
