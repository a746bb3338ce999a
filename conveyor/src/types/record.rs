use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the source a record originated from.
///
/// Sources are identified by a small integer assigned by the caller. The id
/// travels with every record as its provenance tag and keys the
/// unavailable-source set of degraded results.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar value stored in a record field.
///
/// Values are self-contained and serializable so that batches can cross into
/// the parallel compute domain without referencing any resource owned by the
/// cooperative side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Returns the integer value if this is [`Value::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string slice if this is [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value}"),
        }
    }
}

/// A single record flowing through the pipeline.
///
/// A record is an ordered mapping of field names to scalar values plus the
/// provenance tag of the source that produced it. Records are immutable once
/// produced: transforms build new records instead of mutating in place, and
/// each record is consumed exactly once by the stage that reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    source_id: SourceId,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates a new record from a source id and ordered fields.
    pub fn new(source_id: SourceId, fields: Vec<(String, Value)>) -> Self {
        Self { source_id, fields }
    }

    /// Returns the id of the source that produced this record.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Returns the ordered fields of this record.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Returns the value of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Consumes the record and returns its ordered fields.
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_is_preserved() {
        let record = Record::new(
            SourceId(1),
            vec![
                ("b".to_string(), Value::Int(2)),
                ("a".to_string(), Value::Int(1)),
            ],
        );

        let names: Vec<_> = record.fields().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn lookup_by_name_finds_first_match() {
        let record = Record::new(
            SourceId(1),
            vec![("seq".to_string(), Value::Int(7))],
        );

        assert_eq!(record.get("seq").and_then(Value::as_int), Some(7));
        assert!(record.get("missing").is_none());
    }
}
