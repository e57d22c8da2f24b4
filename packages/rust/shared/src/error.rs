//! Error types for Draftline.
//!
//! Library crates use [`DraftlineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Draftline operations.
#[derive(Debug, thiserror::Error)]
pub enum DraftlineError {
    /// Configuration loading or validation error. Also covers per-item
    /// fatal config problems such as a slug missing from the taxonomy.
    #[error("config error: {message}")]
    Config { message: String },

    /// Generation service failure (unreachable, malformed or empty output).
    #[error("generation error: {0}")]
    Generation(String),

    /// Frontmatter or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A link macro could not be resolved, or a required link role is
    /// missing after resolution.
    #[error("link resolution error: {message}")]
    LinkResolution { message: String },

    /// Structural validation failed with blocking violations.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// CMS rejected the credentials. Never retried.
    #[error("authentication error: {0}")]
    Auth(String),

    /// CMS rejected one or more fields of the payload. Never retried.
    #[error("field rejected by remote: {0}")]
    FieldRejected(String),

    /// Transient network failure (timeout, connect, 429, 5xx). The only
    /// retryable class.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DraftlineError>;

impl DraftlineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a link resolution error from any displayable message.
    pub fn link(msg: impl Into<String>) -> Self {
        Self::LinkResolution {
            message: msg.into(),
        }
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

    /// Whether this failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
