use std::future::Future;

use crate::error::ConveyorResult;
use crate::types::{Record, SourceId};

/// Trait for producers of records.
///
/// A [`Source`] yields records one at a time; reads may suspend on I/O, and
/// suspension yields control back to the runtime so the other sources keep
/// making progress. Record order within one source is preserved end-to-end;
/// no order is guaranteed across sources.
///
/// Implementations are driven by exactly one ingest worker, so reads take
/// `&mut self` and need no internal synchronization.
pub trait Source {
    /// Returns the provenance id stamped on every record of this source.
    fn source_id(&self) -> SourceId;

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` once the source is exhausted. Errors are
    /// classified by their [`crate::error::ErrorKind`]: transient read
    /// failures are eligible for automatic retries, permanent ones terminate
    /// this source without affecting its siblings.
    fn next_record(&mut self) -> impl Future<Output = ConveyorResult<Option<Record>>> + Send;

    /// Releases any resource held by the source.
    ///
    /// Called exactly once when the ingest worker stops, regardless of how
    /// it stopped. The default implementation is a no-op.
    fn close(&mut self) -> impl Future<Output = ConveyorResult<()>> + Send {
        async { Ok(()) }
    }
}
