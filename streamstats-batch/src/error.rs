use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use streamstats::error::StreamStatsError;
use streamstats_telemetry::tracing::TracingError;

fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type BatchResult<T> = Result<T, BatchError>;

/// Backtrace holder, so the variants below can be derived as `Debug`.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that end a batch run.
#[derive(Debug)]
pub enum BatchError {
    /// Loading, processing or exporting failed.
    Pipeline(StreamStatsError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Telemetry(TracingError, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl BatchError {
    pub fn category(&self) -> &'static str {
        match self {
            BatchError::Pipeline(_) => "batch error",
            BatchError::Config(_, _) => "configuration error",
            BatchError::Telemetry(_, _) => "logging error",
            BatchError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            BatchError::Pipeline(err) => err.backtrace(),
            BatchError::Config(_, cb) => Some(&cb.0),
            BatchError::Telemetry(_, cb) => Some(&cb.0),
            BatchError::Io(_, cb) => Some(&cb.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        BatchError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Multi-line report printed to stderr before exiting.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("batch failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        if let BatchError::Pipeline(err) = self {
            let kinds: Vec<String> = err.kinds().iter().map(|kind| format!("{kind:?}")).collect();
            out.push_str(&format!("kinds: {}\n", kinds.join(", ")));
        }

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Pipeline(err) => write!(f, "{}", err.summary()),
            BatchError::Config(source, _) => write!(f, "configuration error: {source}"),
            BatchError::Telemetry(source, _) => write!(f, "logging error: {source}"),
            BatchError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for BatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BatchError::Pipeline(err) => err.source(),
            BatchError::Config(source, _) => Some(source.as_ref()),
            BatchError::Telemetry(source, _) => Some(source),
            BatchError::Io(source, _) => Some(source),
        }
    }
}

impl From<StreamStatsError> for BatchError {
    fn from(err: StreamStatsError) -> Self {
        BatchError::Pipeline(err)
    }
}

impl From<TracingError> for BatchError {
    fn from(err: TracingError) -> Self {
        BatchError::Telemetry(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for BatchError {
    fn from(err: std::io::Error) -> Self {
        BatchError::Io(err, CapturedBacktrace::capture())
    }
}
