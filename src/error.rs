//! Error types for the mail pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while processing a transaction.
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O error with the associated file path.
    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, SinkError>`.
pub type Result<T> = std::result::Result<T, SinkError>;

impl SinkError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
