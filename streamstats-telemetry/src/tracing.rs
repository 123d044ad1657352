//! Tracing subscriber setup for batch runs and tests.
//!
//! Batch runs log to stdout and, when a directory is given, to `streamstats.log` inside it so
//! the log ends up next to the processed input file.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Name of the log file written next to the input.
pub const LOG_FILE_NAME: &str = "streamstats.log";

const DEFAULT_FILTER: &str = "info";

static TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to prepare log directory `{path}`: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Flushes buffered file logs when dropped. Keep it alive until the process exits.
#[must_use]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
    log_file: Option<PathBuf>,
}

impl LogFlusher {
    /// Path of the log file, if file logging is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber for `app_name`.
///
/// The level defaults to `info` and follows `RUST_LOG` when set. With `log_dir`, records are
/// also appended (without ANSI colors) to [`LOG_FILE_NAME`] in that directory.
pub fn init_tracing(app_name: &str, log_dir: Option<&Path>) -> Result<LogFlusher, TracingError> {
    let stdout_layer = fmt::layer().with_target(false);

    let (file_layer, guard, log_file) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| TracingError::LogDirectory {
                path: dir.to_path_buf(),
                source,
            })?;

            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);

            (Some(layer), Some(guard), Some(dir.join(LOG_FILE_NAME)))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(app_name, log_file = ?log_file, "tracing initialized");

    Ok(LogFlusher {
        _guard: guard,
        log_file,
    })
}

/// Installs a test-friendly subscriber once per process.
///
/// Output goes through the test writer so it is captured per test. Later calls are no-ops.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_can_be_initialized_repeatedly() {
        init_test_tracing();
        init_test_tracing();
        tracing::info!("still logging");
    }
}
