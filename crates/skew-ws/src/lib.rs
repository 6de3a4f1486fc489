//! WebSocket session for the options exchange.
//!
//! Provides the authenticated JSON-RPC connection with:
//! - Client-signature authentication and background token refresh
//! - Server heartbeat replies (hard liveness contract)
//! - Fixed request ids for response correlation
//! - Always-on / dynamic channel tracking with minimal diffs
//! - Channel-based, fire-and-forget request sending

pub mod auth;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod requests;
pub mod signer;
pub mod subscription;
pub mod ws_write_handle;

pub use auth::{RefreshPolicy, SessionTokens};
pub use connection::{Credentials, SessionConfig, SessionManager, SessionState};
pub use error::{WsError, WsResult};
pub use heartbeat::HeartbeatMonitor;
pub use message::{
    AuthResult, ChannelMessage, JsonRpcRequest, RequestKind, RpcError, RpcNotification,
    RpcResponse, WsMessage,
};
pub use requests::{ComboLeg, OrderParams, OrderType, SimulatedPositions};
pub use signer::{generate_nonce, signing_input, AuthSigner, KeySource, SignerError};
pub use subscription::{ChannelSet, SubscriptionDiff, SubscriptionManager};
pub use ws_write_handle::{SendError, WsOutbound, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
