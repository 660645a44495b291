//! Error types for dkim-verify.

use thiserror::Error;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for dkim-verify.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded, saved or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server failure.
    #[error("Server error: {0}")]
    Server(String),
}
