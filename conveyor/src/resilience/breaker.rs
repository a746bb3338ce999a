//! Circuit breaker guarding a single dependency.

use conveyor_config::shared::CircuitBreakerConfig;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::conveyor_error;
use crate::error::{ConveyorResult, ErrorClass, ErrorKind};

/// Health state of a guarded dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls fail fast without contacting the dependency.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

/// How an incoming call is admitted by the breaker.
enum Admission {
    /// Regular pass-through in the closed state.
    Regular,
    /// The one probe call admitted after the reset timeout.
    Probe,
    /// Fast-fail without touching the dependency.
    Rejected,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Stateful guard around one dependency.
///
/// Each breaker owns its state exclusively: construct one instance per
/// guarded dependency and inject it where the dependency is called. State is
/// only ever updated by calls routed through [`CircuitBreaker::call`], plus
/// the explicit operator [`CircuitBreaker::reset`].
///
/// Transitions follow the classic three-state machine: `failure_threshold`
/// consecutive failures open the circuit; after `reset_timeout` the next
/// incoming call is admitted as a probe (lazily, there is no background
/// timer); a successful probe closes the circuit, a failed one re-opens it
/// and restarts the timeout clock. While the probe is in flight, concurrent
/// callers fail fast so at most one call reaches a recovering dependency.
///
/// Cancellation signals and nested circuit-open errors do not drive the
/// state machine: neither represents an observed failure of this dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new breaker in the closed state.
    pub fn new(name: &'static str, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Builds a breaker from its configuration value.
    pub fn from_config(name: &'static str, config: &CircuitBreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_millis(config.reset_timeout_ms),
        )
    }

    /// Returns the current state of the breaker.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Returns the current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Operator reset: forces the breaker back to closed and clears all
    /// counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;

        info!(breaker = self.name, "circuit breaker reset by operator");
    }

    /// Invokes `op` through the breaker.
    ///
    /// While the circuit is open this fails immediately with
    /// [`ErrorKind::CircuitOpen`], with zero contact to the dependency. In
    /// every other case the underlying error is re-raised unmodified; the
    /// breaker absorbs nothing.
    pub async fn call<T, F>(&self, op: F) -> ConveyorResult<T>
    where
        F: AsyncFnOnce() -> ConveyorResult<T>,
    {
        let is_probe = match self.admit() {
            Admission::Rejected => return Err(self.open_error()),
            Admission::Probe => true,
            Admission::Regular => false,
        };

        // If the probe future is dropped before producing an outcome, the
        // guard releases the probe slot so the next caller can probe again.
        let mut probe_slot = ProbeSlot {
            breaker: self,
            armed: is_probe,
        };

        let result = op().await;
        probe_slot.armed = false;

        match &result {
            Ok(_) => self.on_success(is_probe),
            Err(err) => self.on_failure(is_probe, err.class()),
        }

        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // The inner mutex is never held across a suspension point, so a
        // poisoned lock can only come from a panic inside the breaker
        // bookkeeping itself.
        self.inner.lock().expect("circuit breaker state poisoned")
    }

    fn admit(&self) -> Admission {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Admission::Regular,
            CircuitState::Open => {
                let timeout_elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);

                if timeout_elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;

                    info!(
                        breaker = self.name,
                        "reset timeout elapsed, circuit half-open, admitting probe"
                    );

                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    fn on_success(&self, is_probe: bool) {
        let mut inner = self.lock();

        if is_probe {
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.probe_in_flight = false;

            info!(breaker = self.name, "probe succeeded, circuit closed");
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, is_probe: bool, class: ErrorClass) {
        // Cancellation is not a failure, and a nested circuit-open means no
        // contact happened; neither observation belongs to this dependency.
        if matches!(class, ErrorClass::Cancelled | ErrorClass::CircuitOpen) {
            if is_probe {
                self.lock().probe_in_flight = false;
            }
            return;
        }

        let mut inner = self.lock();

        if is_probe {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            inner.probe_in_flight = false;

            warn!(breaker = self.name, "probe failed, circuit re-opened");
            return;
        }

        if inner.state == CircuitState::Closed {
            inner.consecutive_failures += 1;

            if inner.consecutive_failures >= self.failure_threshold {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());

                warn!(
                    breaker = self.name,
                    consecutive_failures = inner.consecutive_failures,
                    "failure threshold reached, circuit opened"
                );
            }
        }
    }

    fn open_error(&self) -> crate::error::ConveyorError {
        conveyor_error!(
            ErrorKind::CircuitOpen,
            "Circuit breaker is open",
            format!(
                "calls to '{}' fail fast until the reset timeout elapses",
                self.name
            )
        )
    }
}

struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}
