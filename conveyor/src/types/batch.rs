use serde::{Deserialize, Serialize};

use crate::types::Record;

/// Identifier of a batch, assigned at dispatch time.
///
/// Batch ids increase monotonically in submission order and are used to
/// reassemble output order after parallel computation.
pub type BatchId = u64;

/// An ordered, finite group of records submitted together to the compute
/// pool.
///
/// Batching amortizes the fixed cost of crossing into the parallel domain
/// over many records. Batch membership is determined solely by arrival order
/// into the dispatcher; batches carry no other structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    id: BatchId,
    records: Vec<Record>,
}

impl RecordBatch {
    /// Creates a new batch with the given id and records.
    pub fn new(id: BatchId, records: Vec<Record>) -> Self {
        Self { id, records }
    }

    /// Returns the id of this batch.
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Returns the records in this batch.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the number of records in this batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if this batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the batch and returns its records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
