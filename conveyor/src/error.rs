//! Error types and result definitions for conveyor operations.
//!
//! Provides an error system with classification, aggregation, and captured
//! diagnostic metadata. The [`ConveyorError`] type supports single errors,
//! errors with additional detail, and multiple aggregated errors for the case
//! where several workers fail independently.
//!
//! Every [`ErrorKind`] maps onto one [`ErrorClass`], the failure taxonomy that
//! drives retry eligibility, circuit breaker accounting, and degradation
//! handling:
//!
//! - [`ErrorClass::Transient`] failures are expected to self-resolve and are
//!   eligible for retry.
//! - [`ErrorClass::Permanent`] failures are defects in the call itself and
//!   are never retried.
//! - [`ErrorClass::CircuitOpen`] marks the distinguished fast-fail raised by
//!   an open circuit breaker: no contact with the dependency was attempted.
//! - [`ErrorClass::Cancelled`] is not a failure at all but a cooperative
//!   request to stop, and must be re-raised after any cleanup.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for conveyor operations using [`ConveyorError`] as
/// the error type.
pub type ConveyorResult<T> = Result<T, ConveyorError>;

/// Failure taxonomy used by the resilience layers.
///
/// See the module documentation for what each class means for retry, circuit
/// breaking, and degradation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Expected to self-resolve; eligible for retry.
    Transient,
    /// A defect in the call itself; never retried, always propagated.
    Permanent,
    /// Fast-fail raised in place of contacting an unhealthy dependency.
    CircuitOpen,
    /// Cooperative stop request; not a failure.
    Cancelled,
}

/// Specific categories of errors that can occur during conveyor operations.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Source errors
    SourceReadFailed,
    SourceCloseFailed,

    // Record & transform errors
    InvalidRecord,
    TransformFailed,

    // Sink errors
    SinkWriteFailed,

    // Channel & coordination errors
    ChannelClosed,
    InvalidState,

    // Worker lifecycle errors
    IngestWorkerPanic,
    ComputeWorkerPanic,
    DispatchWorkerPanic,
    OperationCanceled,

    // Resilience signals
    CircuitOpen,

    // Configuration & I/O
    ConfigError,
    IoError,
    SerializationError,
    DeserializationError,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns the [`ErrorClass`] this kind belongs to.
    ///
    /// The transient set is deliberately narrow: only failures that are
    /// expected to recover without intervention qualify for automatic
    /// retries. Everything unclassified defaults to permanent so that new
    /// kinds never silently become retryable.
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorKind::SourceReadFailed
            | ErrorKind::SinkWriteFailed
            | ErrorKind::IoError => ErrorClass::Transient,

            ErrorKind::OperationCanceled => ErrorClass::Cancelled,

            ErrorKind::CircuitOpen => ErrorClass::CircuitOpen,

            ErrorKind::SourceCloseFailed
            | ErrorKind::InvalidRecord
            | ErrorKind::TransformFailed
            | ErrorKind::ChannelClosed
            | ErrorKind::InvalidState
            | ErrorKind::IngestWorkerPanic
            | ErrorKind::ComputeWorkerPanic
            | ErrorKind::DispatchWorkerPanic
            | ErrorKind::ConfigError
            | ErrorKind::SerializationError
            | ErrorKind::DeserializationError
            | ErrorKind::Unknown => ErrorClass::Permanent,
        }
    }
}

/// Detailed payload stored for single [`ConveyorError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for conveyor operations.
#[derive(Debug, Clone)]
pub struct ConveyorError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
///
/// The `Many` variant captures multiple worker failures behind a single
/// error, preserving each inner error in full.
#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<ConveyorError>,
        location: &'static Location<'static>,
    },
}

impl ConveyorError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the [`ErrorClass`] of this error, derived from its kind.
    pub fn class(&self) -> ErrorClass {
        self.kind().class()
    }

    /// Returns `true` if this error is eligible for retry.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Returns `true` if this error is a cooperative cancellation signal.
    pub fn is_cancellation(&self) -> bool {
        self.class() == ErrorClass::Cancelled
    }

    /// Returns `true` if this error is a circuit breaker fast-fail.
    pub fn is_circuit_open(&self) -> bool {
        self.class() == ErrorClass::CircuitOpen
    }

    /// Returns the detailed error information if available.
    ///
    /// For aggregated errors, returns the detail of the first error that has
    /// one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    ///
    /// Has no effect on aggregated errors because aggregates forward the
    /// first contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates a [`ConveyorError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        let location = Location::caller();
        let backtrace = Arc::new(Backtrace::capture());

        ConveyorError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location,
                backtrace,
            }),
        }
    }
}

impl PartialEq for ConveyorError {
    fn eq(&self, other: &ConveyorError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for ConveyorError {
    /// Hashes the error using only its stable identifying components.
    ///
    /// Location, detail, source, and backtrace are intentionally excluded so
    /// that errors of the same category hash identically, enabling grouping
    /// and deduplication across occurrences.
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                std::mem::discriminant(&self.repr).hash(state);
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                std::mem::discriminant(&self.repr).hash(state);
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for ConveyorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail: {detail}")?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {}", index + 1, line)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ConveyorError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            // Aggregated errors forward the first contained error.
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates a [`ConveyorError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ConveyorError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ConveyorError {
        ConveyorError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`ConveyorError`] from an error kind, static description, and
/// dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ConveyorError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ConveyorError {
        ConveyorError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`ConveyorError`] from a vector of errors for aggregation.
///
/// A vector with exactly one error is returned directly, without the `Many`
/// wrapper.
impl<E> From<Vec<E>> for ConveyorError
where
    E: Into<ConveyorError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ConveyorError {
        let location = Location::caller();

        let mut errors: Vec<ConveyorError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        ConveyorError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts [`std::io::Error`] to [`ConveyorError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for ConveyorError {
    #[track_caller]
    fn from(err: std::io::Error) -> ConveyorError {
        let detail = err.to_string();
        let source = Arc::new(err);
        ConveyorError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

/// Converts [`serde_json::Error`] to [`ConveyorError`] with the appropriate
/// error kind based on the error classification.
impl From<serde_json::Error> for ConveyorError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ConveyorError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        let detail = err.to_string();
        let source = Arc::new(err);
        ConveyorError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}
