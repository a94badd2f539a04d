//! Error types for Artemis.
//!
//! Library crates use [`ArtemisError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Artemis operations.
#[derive(Debug, thiserror::Error)]
pub enum ArtemisError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Seed URL is malformed or not `http(s)`. Raised before any I/O.
    #[error("invalid seed URL '{url}': {reason}")]
    InvalidSeedUrl { url: String, reason: String },

    /// The target path is disallowed by the origin's robots.txt.
    #[error("blocked by robots.txt: {0}")]
    RobotsDisallowed(String),

    /// Request exceeded its timeout.
    #[error("fetch timed out: {0}")]
    FetchTimeout(String),

    /// Network/HTTP error during a fetch.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The external evaluation collaborator failed.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// The external advisory collaborator failed.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArtemisError>;

impl ArtemisError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-seed error.
    pub fn invalid_seed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSeedUrl {
            url: url.into(),
            reason: reason.into(),
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

    /// Transient failures that count toward a retry budget. Anything else
    /// is returned to the caller without retry or escalation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchTimeout(_) | Self::Network(_))
    }
}
