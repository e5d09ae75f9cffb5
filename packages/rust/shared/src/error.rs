//! Error types for RivalMap.
//!
//! Library crates use [`RivalmapError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-page fetch failures are deliberately NOT part of this type: they are
//! retried, recorded on the crawl outcome, and never abort a run. See the
//! crawler crate's `FetchError`.

use std::path::PathBuf;

/// Top-level error type for all RivalMap operations.
#[derive(Debug, thiserror::Error)]
pub enum RivalmapError {
    /// Configuration loading or validation error. Fails a run before it starts.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the per-page retry path.
    #[error("network error: {0}")]
    Network(String),

    /// Crawl engine failure outside the per-page retry path, such as a
    /// worker panic. Aborts the run.
    #[error("crawl error: {0}")]
    Crawl(String),

    /// HTML or record parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Record stream or manifest storage error.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RivalmapError>;

impl RivalmapError {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RivalmapError::config("page_budget must be one of 50, 100, 300");
        assert_eq!(
            err.to_string(),
            "config error: page_budget must be one of 50, 100, 300"
        );

        let err = RivalmapError::validation("manifest schema_version 99 not supported");
        assert!(err.to_string().contains("schema_version 99"));
    }
}
