//! Error types for skew-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid expiration label: {0}")]
    InvalidExpiration(String),

    #[error("Invalid instrument name: {0}")]
    InvalidInstrument(String),

    #[error("Invalid spread direction: {0}")]
    InvalidDirection(String),

    #[error("Invalid order side: {0}")]
    InvalidOrderSide(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
