use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Default timeout for test notifications.
///
/// Most waits in tests resolve within milliseconds; anything near this bound
/// indicates a wedged pipeline rather than a slow one.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// A wrapper around [`Arc<Notify>`] that fails fast in tests.
///
/// Waiting on a raw [`Notify`] can hang a test forever when the expected
/// state change never happens. This wrapper panics once the timeout elapses
/// so the test fails with a clear message instead.
#[derive(Debug, Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    /// Creates a new [`TimedNotify`] with the default timeout.
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    /// Creates a new [`TimedNotify`] with a custom timeout duration.
    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for a notification.
    ///
    /// # Panics
    ///
    /// Panics if the timeout elapses first. This is intentional: the test
    /// should fail fast rather than hang.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "test notification timed out after {:?}; the expected state was never reached",
                self.timeout_duration
            );
        }
    }

    /// Returns the underlying [`Arc<Notify>`] for direct access.
    pub fn inner(&self) -> &Arc<Notify> {
        &self.notify
    }
}
