//! Core data types carried through conveyor pipelines.

mod batch;
mod record;
mod result;

pub use batch::{BatchId, RecordBatch};
pub use record::{Record, SourceId, Value};
pub use result::DegradedBatchResult;

/// Identifier for a pipeline instance, used to label logs and spans.
pub type PipelineId = u64;
