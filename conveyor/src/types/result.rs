use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Record, SourceId};

/// Best-effort result of a fan-out over guarded source calls.
///
/// Produced by the degradation aggregator: the records of every call that
/// succeeded, the ids of every source that did not, and a flag marking the
/// result as partial. Created fresh per aggregation round and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedBatchResult {
    available: Vec<Record>,
    unavailable_sources: BTreeSet<SourceId>,
    degraded: bool,
}

impl DegradedBatchResult {
    /// Creates a new result from the available records and the set of
    /// unavailable sources.
    ///
    /// The `degraded` flag is derived: it is set iff at least one source was
    /// unavailable.
    pub fn new(available: Vec<Record>, unavailable_sources: BTreeSet<SourceId>) -> Self {
        let degraded = !unavailable_sources.is_empty();

        Self {
            available,
            unavailable_sources,
            degraded,
        }
    }

    /// Returns the records of all sources that responded.
    pub fn available(&self) -> &[Record] {
        &self.available
    }

    /// Returns the ids of all sources that failed to respond.
    pub fn unavailable_sources(&self) -> &BTreeSet<SourceId> {
        &self.unavailable_sources
    }

    /// Returns `true` if at least one source was unavailable.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Consumes the result and returns the available records.
    pub fn into_available(self) -> Vec<Record> {
        self.available
    }
}
