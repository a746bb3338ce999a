use std::future::Future;

use crate::error::ConveyorResult;
use crate::types::{DegradedBatchResult, Record};

/// Trait for systems that receive the output of a pipeline.
///
/// [`Sink`] implementations define where processed records end up. Batches
/// arrive in dispatch order: output order across batches matches submission
/// order even though batches complete in parallel.
///
/// Implementations should tolerate repeated writes of the same batch, since
/// a transiently failed write may be retried.
pub trait Sink {
    /// Returns the name of the sink.
    fn name() -> &'static str;

    /// Writes one reassembled batch of records.
    fn write_batch(&self, records: Vec<Record>)
    -> impl Future<Output = ConveyorResult<()>> + Send;

    /// Writes the best-effort result of a degraded fan-out round.
    ///
    /// The default implementation forwards the available records to
    /// [`Sink::write_batch`], dropping the unavailability metadata. Override
    /// it when the sink can represent partial results explicitly.
    fn write_degraded(
        &self,
        result: DegradedBatchResult,
    ) -> impl Future<Output = ConveyorResult<()>> + Send
    where
        Self: Sync,
    {
        async move { self.write_batch(result.into_available()).await }
    }
}
