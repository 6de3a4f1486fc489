//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] skew_ws::WsError),

    #[error("Signer error: {0}")]
    Signer(#[from] skew_ws::SignerError),

    #[error("Core error: {0}")]
    Core(#[from] skew_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] skew_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] skew_persistence::PersistenceError),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
