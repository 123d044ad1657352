use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`pipeline.backends` must name at least one backend")]
    NoBackends,
    #[error("`pipeline.backends` contains a blank backend name")]
    BlankBackend,
    #[error("`pipeline.backends` lists `{0}` more than once")]
    DuplicateBackend(String),
    #[error("`pipeline.request_timeout_ms` cannot be zero")]
    RequestTimeoutZero,
    #[error("Invalid polling config: {0}")]
    PollingConfig(String),
    /// A backend-affine endpoint template is missing its `{backend}` placeholder.
    #[error("endpoint `{0}` must contain the `{{backend}}` placeholder")]
    MissingBackendPlaceholder(&'static str),
}
