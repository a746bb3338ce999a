use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{ConveyorError, ConveyorResult};
use crate::source::Source;
use crate::types::{Record, SourceId, Value};

/// Builds a sample record with a sequence number and a payload field.
pub fn sample_record(source_id: SourceId, seq: i64) -> Record {
    Record::new(
        source_id,
        vec![
            ("seq".to_string(), Value::Int(seq)),
            (
                "payload".to_string(),
                Value::String(format!("record-{source_id}-{seq}")),
            ),
        ],
    )
}

/// One scripted outcome of a [`ScriptedSource`] read.
#[derive(Debug)]
enum ScriptedRead {
    Emit(Record),
    Fail(ConveyorError),
}

/// Source that replays a scripted sequence of reads.
///
/// Each read optionally waits a configurable latency first, simulating the
/// I/O suspension of a real source, then pops the next scripted outcome. An
/// empty script means end of stream. The close flag records whether
/// [`Source::close`] ran, so tests can assert resource release.
#[derive(Debug)]
pub struct ScriptedSource {
    source_id: SourceId,
    script: VecDeque<ScriptedRead>,
    read_delay: Duration,
    next_seq: i64,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    /// Creates a source with an empty script.
    pub fn new(source_id: SourceId) -> Self {
        Self {
            source_id,
            script: VecDeque::new(),
            read_delay: Duration::ZERO,
            next_seq: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a source that emits `count` sample records and ends.
    pub fn emitting(source_id: SourceId, count: usize) -> Self {
        let mut source = Self::new(source_id);
        for _ in 0..count {
            let seq = source.next_seq;
            source.next_seq += 1;
            source.script.push_back(ScriptedRead::Emit(sample_record(source_id, seq)));
        }
        source
    }

    /// Adds a latency before every read.
    pub fn with_read_delay(mut self, read_delay: Duration) -> Self {
        self.read_delay = read_delay;
        self
    }

    /// Appends a sample record with the given sequence number to the script.
    pub fn then_emit_sample(mut self, seq: i64) -> Self {
        self.script
            .push_back(ScriptedRead::Emit(sample_record(self.source_id, seq)));
        self
    }

    /// Appends a failing read to the script.
    pub fn then_fail(mut self, error: ConveyorError) -> Self {
        self.script.push_back(ScriptedRead::Fail(error));
        self
    }

    /// Returns a flag that turns true once the source was closed.
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

impl Source for ScriptedSource {
    fn source_id(&self) -> SourceId {
        self.source_id
    }

    async fn next_record(&mut self) -> ConveyorResult<Option<Record>> {
        if !self.read_delay.is_zero() {
            sleep(self.read_delay).await;
        }

        match self.script.pop_front() {
            None => Ok(None),
            Some(ScriptedRead::Emit(record)) => Ok(Some(record)),
            Some(ScriptedRead::Fail(error)) => Err(error),
        }
    }

    async fn close(&mut self) -> ConveyorResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
