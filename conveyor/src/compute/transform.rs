use crate::error::ConveyorResult;
use crate::types::RecordBatch;

/// A CPU-bound transformation applied to whole batches on the compute pool.
///
/// Implementations must be stateless across calls: a transform receives a
/// self-contained batch, computes, and returns a self-contained result.
/// Statelessness is what makes adding workers safe without any new
/// synchronization, so transforms must not keep cross-call mutable state and
/// must not reference cooperative-domain resources (open handles, locks,
/// channels).
///
/// Errors are classified by their [`crate::error::ErrorKind`]: a transient
/// failure makes the whole batch eligible for resubmission, a permanent one
/// fails the batch.
pub trait BatchTransform: Send + Sync + 'static {
    /// Returns the name of the transform, used in logs and spans.
    fn name(&self) -> &'static str;

    /// Transforms one batch into a new batch.
    ///
    /// Runs on a blocking worker, so implementations may compute freely
    /// without yield points. The output batch must keep the input's id.
    fn apply(&self, batch: RecordBatch) -> ConveyorResult<RecordBatch>;
}
