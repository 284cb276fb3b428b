//! Error types for stagegate.
//!
//! Library crates use [`StageGateError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Sequencing rejections from the cursor and gate are deliberately *not*
//! part of this enum; they are ordinary values the driving agent reacts to.

use std::path::PathBuf;

/// Top-level error type for all stagegate operations.
#[derive(Debug, thiserror::Error)]
pub enum StageGateError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Artifact store or database error.
    #[error("storage error: {0}")]
    Storage(String),

    /// External data source (company table, press releases) error.
    #[error("source error: {0}")]
    Source(String),

    /// JSON/TOML parsing or artifact format error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier, invalid key, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Artifact does not exist.
    #[error("artifact not found: {path}")]
    NotFound { path: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StageGateError>;

impl StageGateError {
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

    /// Artifact missing at `path`.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Whether this error means "the artifact is absent" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
