use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::compute::BatchTransform;
use crate::conveyor_error;
use crate::error::{ConveyorResult, ErrorKind};
use crate::types::{Record, RecordBatch, Value};

/// Transform that returns every batch unchanged.
pub struct IdentityTransform;

impl BatchTransform for IdentityTransform {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn apply(&self, batch: RecordBatch) -> ConveyorResult<RecordBatch> {
        Ok(batch)
    }
}

/// Transform that uppercases every string value.
pub struct UppercaseTransform;

impl BatchTransform for UppercaseTransform {
    fn name(&self) -> &'static str {
        "uppercase"
    }

    fn apply(&self, batch: RecordBatch) -> ConveyorResult<RecordBatch> {
        let id = batch.id();
        let records = batch
            .into_records()
            .into_iter()
            .map(|record| {
                let source_id = record.source_id();
                let fields = record
                    .into_fields()
                    .into_iter()
                    .map(|(name, value)| match value {
                        Value::String(text) => (name, Value::String(text.to_uppercase())),
                        other => (name, other),
                    })
                    .collect();
                Record::new(source_id, fields)
            })
            .collect();

        Ok(RecordBatch::new(id, records))
    }
}

/// Transform that fails its first `failures` applications, then passes
/// batches through unchanged.
///
/// Used to exercise whole-batch resubmission; the error kind determines
/// whether the failure counts as transient.
pub struct FlakyTransform {
    failures_remaining: AtomicU32,
    kind: ErrorKind,
}

impl FlakyTransform {
    /// Creates a transform that fails `failures` times with `kind`.
    pub fn new(failures: u32, kind: ErrorKind) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            kind,
        }
    }
}

impl BatchTransform for FlakyTransform {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn apply(&self, batch: RecordBatch) -> ConveyorResult<RecordBatch> {
        let remaining = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| {
                value.checked_sub(1)
            });

        match remaining {
            Ok(_) => Err(conveyor_error!(
                self.kind,
                "Injected transform failure",
                format!("batch {}", batch.id())
            )),
            Err(_) => Ok(batch),
        }
    }
}

/// Transform that sleeps for a batch-dependent time before passing the batch
/// through.
///
/// Successive batches finish out of order, which is exactly what reassembly
/// tests need to prove order restoration.
pub struct StaggeredDelayTransform {
    step_ms: u64,
}

impl StaggeredDelayTransform {
    /// Creates a transform whose delay is `(batch_id % 3) * step_ms`.
    pub fn new(step_ms: u64) -> Self {
        Self { step_ms }
    }
}

impl BatchTransform for StaggeredDelayTransform {
    fn name(&self) -> &'static str {
        "staggered_delay"
    }

    fn apply(&self, batch: RecordBatch) -> ConveyorResult<RecordBatch> {
        let delay = (batch.id() % 3) * self.step_ms;
        std::thread::sleep(Duration::from_millis(delay));
        Ok(batch)
    }
}
