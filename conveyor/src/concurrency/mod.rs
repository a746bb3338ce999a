//! Concurrency primitives coordinating the two execution domains.
//!
//! The pipeline spans a cooperative domain (async tasks that yield only at
//! explicit suspension points) and a parallel compute domain (blocking
//! workers with no shared state). This module holds everything that sits on
//! or crosses that boundary:
//!
//! - [`channel`]: the bounded record queue between ingest and dispatch, the
//!   only structure mutated by both sides concurrently and the sole
//!   backpressure mechanism of the core.
//! - [`future`]: [`future::PendingUnit`], the awaitable handle for a batch
//!   in flight on the compute pool.
//! - [`shutdown`]: watch-based broadcast used to request cooperative
//!   cancellation; observed at suspension points, never preemptive.
//! - [`stream`]: the size- and timeout-based batching stream the dispatch
//!   worker consumes.
//!
//! Suspension points in the cooperative domain are channel put/get, retry
//! delays, pending-unit awaits, and shutdown waits. Between two suspension
//! points a task runs atomically with respect to its siblings, so state that
//! lives entirely within the cooperative domain needs no locking.

pub mod channel;
pub mod future;
pub mod shutdown;
pub mod stream;
