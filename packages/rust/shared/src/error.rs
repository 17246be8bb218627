//! Error types for doctrail.
//!
//! Library crates use [`DoctrailError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all doctrail operations.
#[derive(Debug, thiserror::Error)]
pub enum DoctrailError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Clone/pull failure reported by the version-control transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Snapshot capture, persistence, or lookup failure.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Post rendering failure.
    #[error("render error: {0}")]
    Render(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad remote name, schema mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DoctrailError>;

impl DoctrailError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a snapshot error.
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a render error.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DoctrailError::config("missing base_dir");
        assert_eq!(err.to_string(), "config error: missing base_dir");

        let err = DoctrailError::transport("git clone exited with status 128");
        assert!(err.to_string().starts_with("transport error:"));
        assert!(err.to_string().contains("128"));
    }

    #[test]
    fn io_error_keeps_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = DoctrailError::io("/tmp/x/snapshot", source);
        assert!(err.to_string().contains("/tmp/x/snapshot"));
        assert!(matches!(err, DoctrailError::Io { .. }));
    }
}
