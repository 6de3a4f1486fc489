//! WebSocket session error types.

use crate::signer::SignerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Authentication timed out after {0}s")]
    AuthTimeout(u64),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("Heartbeat timeout: no inbound frame for {0}s")]
    HeartbeatTimeout(u64),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
