//! Switchyard error types

use std::time::Duration;

/// Switchyard error types
#[derive(Debug, thiserror::Error)]
pub enum SwitchyardError {
    // Backend/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("backend '{backend}' timed out after {after:?}")]
    Timeout { backend: String, after: Duration },

    /// The backend answered 2xx but the body did not have the configured shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("no backend configured")]
    NoBackend,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Cache errors
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("compression error: {0}")]
    Compression(String),

    // Local execution errors
    #[error("local generation failed: {0}")]
    LocalGeneration(String),

    #[error("model not cached locally: {0}")]
    ModelNotCached(String),

    /// Only one model download runs at a time.
    #[error("a download of {running} is already in progress")]
    DownloadInProgress { running: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SwitchyardError {
    /// Whether this error should be reported to the caller as a client error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<reqwest::Error> for SwitchyardError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SwitchyardError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SwitchyardError::Http(err.to_string()),
        }
    }
}

/// Result type alias for Switchyard operations
pub type Result<T> = std::result::Result<T, SwitchyardError>;
