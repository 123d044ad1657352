//! Error types for batch runs.
//!
//! [`StreamStatsError`] carries an [`ErrorKind`], a static description, optional dynamic detail
//! and source, and the callsite where it was raised. Several errors can be aggregated into one,
//! which is how the worker pool reports multiple failed workers.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type StreamStatsResult<T> = Result<T, StreamStatsError>;

/// Longest response body excerpt kept in error details.
const MAX_BODY_EXCERPT: usize = 512;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct StreamStatsError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Several errors, typically one per failed worker.
    Many {
        errors: Vec<StreamStatsError>,
        location: &'static Location<'static>,
    },
}

/// Classification of failures.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Remote service errors
    RemoteStatus,
    RemoteTimeout,
    RemoteConnectionFailed,
    InvalidResponse,
    IncompleteData,
    BackendAffinityMismatch,

    // Retry bookkeeping
    RetryExhausted,

    // Input & output
    SourceLoadFailed,
    UnsupportedCrs,
    ExportFailed,

    // Configuration
    ConfigError,

    // IO & serialization
    IoError,
    SerializationError,
    DeserializationError,

    // State & workflow
    InvalidState,
    WorkerPanic,

    Unknown,
}

impl ErrorKind {
    /// Whether a stage can raise this kind. Such failures are retried, never propagated.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::RemoteStatus
                | ErrorKind::RemoteTimeout
                | ErrorKind::RemoteConnectionFailed
                | ErrorKind::InvalidResponse
                | ErrorKind::IncompleteData
                | ErrorKind::BackendAffinityMismatch
        )
    }
}

impl StreamStatsError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "multiple errors",
        }
    }

    /// Returns the dynamic detail, or the first one found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// One-line rendering without location or backtrace, suitable for output tables.
    pub fn summary(&self) -> String {
        match self.detail() {
            Some(detail) => format!("[{:?}] {}: {}", self.kind(), self.description(), detail),
            None => format!("[{:?}] {}", self.kind(), self.description()),
        }
    }

    /// Attaches an originating error. No effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        StreamStatsError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for StreamStatsError {
    fn eq(&self, other: &StreamStatsError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for StreamStatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
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

                write_block("Detail", payload.detail.as_deref(), f)?;

                if payload.backtrace.status() == BacktraceStatus::Captured {
                    write_block("Backtrace", Some(&payload.backtrace.to_string()), f)?;
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
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_block(title: &str, body: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(body) = body else {
        return Ok(());
    };

    if body.trim().is_empty() {
        return write!(f, "\n  {title}: <empty>");
    }

    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for StreamStatsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Truncates a response body for inclusion in an error detail.
pub fn body_excerpt(body: &str) -> String {
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_string();
    }

    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

impl From<(ErrorKind, &'static str)> for StreamStatsError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> StreamStatsError {
        StreamStatsError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for StreamStatsError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> StreamStatsError {
        StreamStatsError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for StreamStatsError
where
    E: Into<StreamStatsError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> StreamStatsError {
        let location = Location::caller();
        let mut errors: Vec<StreamStatsError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            return errors.remove(0);
        }

        StreamStatsError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for StreamStatsError {
    #[track_caller]
    fn from(err: std::io::Error) -> StreamStatsError {
        let detail = err.to_string();
        StreamStatsError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for StreamStatsError {
    #[track_caller]
    fn from(err: serde_json::Error) -> StreamStatsError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        let detail = err.to_string();
        StreamStatsError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps transport failures onto the remote error kinds.
impl From<reqwest::Error> for StreamStatsError {
    #[track_caller]
    fn from(err: reqwest::Error) -> StreamStatsError {
        let (kind, description) = if err.is_timeout() {
            (ErrorKind::RemoteTimeout, "Remote call timed out")
        } else if err.is_connect() {
            (ErrorKind::RemoteConnectionFailed, "Could not connect to remote service")
        } else if err.is_status() {
            (ErrorKind::RemoteStatus, "Remote service returned an error status")
        } else if err.is_decode() {
            (ErrorKind::InvalidResponse, "Remote response could not be decoded")
        } else {
            (ErrorKind::RemoteConnectionFailed, "Remote request failed")
        };

        let detail = match err.url() {
            Some(url) => format!("{err} ({url})"),
            None => err.to_string(),
        };
        StreamStatsError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<sqlx::Error> for StreamStatsError {
    #[track_caller]
    fn from(err: sqlx::Error) -> StreamStatsError {
        let detail = err.to_string();
        StreamStatsError::from_components(
            ErrorKind::ExportFailed,
            Cow::Borrowed("Output database operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
