//! Error types for SEO Compass.
//!
//! Library crates use [`SeoCompassError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SEO Compass operations.
#[derive(Debug, thiserror::Error)]
pub enum SeoCompassError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed input such as a bad URL or an unknown status name.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Bad pagination or section argument.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Transient failure while calling an external capability.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Attempted illegal status change or double execution.
    #[error("invalid transition: {message}")]
    InvalidTransition { message: String },

    /// Unknown job id.
    #[error("job not found: {id}")]
    NotFound { id: String },

    /// Archive requested before the job completed.
    #[error("report not ready: {message}")]
    NotReady { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Report archive rendering error.
    #[error("archive error: {0}")]
    Archive(String),

    /// The job queue is closed or full.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeoCompassError>;

impl SeoCompassError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-argument error from any displayable message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    /// Create an invalid-transition error from any displayable message.
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition {
            message: msg.into(),
        }
    }

    /// Create a not-found error for the given job id.
    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a not-ready error from any displayable message.
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status code the API boundary answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::InvalidArgument { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::InvalidTransition { .. } | Self::NotReady { .. } => 409,
            Self::Config { .. }
            | Self::Adapter(_)
            | Self::Storage(_)
            | Self::Archive(_)
            | Self::Dispatch(_)
            | Self::Io { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SeoCompassError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = SeoCompassError::not_found("0190-abc");
        assert_eq!(err.to_string(), "job not found: 0190-abc");

        let err = SeoCompassError::invalid_transition("COMPLETED -> QUEUED");
        assert!(err.to_string().contains("COMPLETED -> QUEUED"));
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(SeoCompassError::validation("bad url").http_status(), 400);
        assert_eq!(SeoCompassError::invalid_argument("limit").http_status(), 400);
        assert_eq!(SeoCompassError::not_found("x").http_status(), 404);
        assert_eq!(SeoCompassError::not_ready("QUEUED").http_status(), 409);
        assert_eq!(SeoCompassError::Storage("locked".into()).http_status(), 500);
    }
}
