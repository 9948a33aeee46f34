//! Error types for the pacer limiters.

use thiserror::Error;

/// Main error type for pacer operations.
///
/// Failures of the operation passed to
/// [`WindowedLimiter::invoke`](crate::ratelimit::WindowedLimiter::invoke) are
/// not wrapped here; they reach the caller in their own type.
#[derive(Error, Debug)]
pub enum PacerError {
    /// A limiter was given a zero capacity, limit, window or interval
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background work was requested outside a tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pacer operations.
pub type Result<T> = std::result::Result<T, PacerError>;
