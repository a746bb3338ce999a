//! The parallel compute domain: CPU-bound batch transforms.
//!
//! CPU-heavy work is forbidden on the cooperative side, where it would
//! starve every other task for its entire duration. Batches cross into this
//! domain as self-contained values, are transformed on blocking workers, and
//! come back through awaitable [`crate::concurrency::future::PendingUnit`]s.

mod pool;
mod transform;

pub use pool::ComputePool;
pub use transform::BatchTransform;
