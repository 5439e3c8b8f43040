//! Error types for the Turnstile admission layer.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Only [`TurnstileError::Unauthenticated`] is ever surfaced to the calling
/// request pipeline; store-related faults are absorbed by the counter engine,
/// which fails open instead of propagating them.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// User-scope evaluation was required but no authenticated caller exists
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors
    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The atomic procedure returned a payload that could not be decoded
    #[error("Malformed procedure result: {0}")]
    MalformedResult(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
