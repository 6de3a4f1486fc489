//! JSON-RPC 2.0 message types.
//!
//! Requests are correlated with responses through a small set of reserved
//! integer ids, one per request family. Pushes (`subscription`,
//! `heartbeat`) carry a `method` instead of an `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Reserved request ids
// ============================================================================

/// Request family, each with a fixed wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `public/auth`, shared by the initial grant and token refresh.
    Auth,
    /// `public/set_heartbeat`
    SetHeartbeat,
    /// `public/test` sent in reply to a heartbeat test request.
    HeartbeatReply,
    /// `private/subscribe` and `private/unsubscribe`
    Subscription,
    /// `private/buy` and `private/sell`
    Order,
    /// `private/cancel`
    Cancel,
    /// `private/edit`
    Edit,
    /// `private/create_combo_order`
    Combo,
    /// `private/simulate_portfolio`
    SimulatePortfolio,
    /// `private/get_positions`
    Positions,
}

impl RequestKind {
    pub const ALL: [RequestKind; 10] = [
        Self::Auth,
        Self::SetHeartbeat,
        Self::HeartbeatReply,
        Self::Subscription,
        Self::Order,
        Self::Cancel,
        Self::Edit,
        Self::Combo,
        Self::SimulatePortfolio,
        Self::Positions,
    ];

    pub const fn id(self) -> u64 {
        match self {
            Self::Auth => 9929,
            Self::SetHeartbeat => 9098,
            Self::HeartbeatReply => 8212,
            Self::Subscription => 42,
            Self::Order => 1001,
            Self::Cancel => 1002,
            Self::Edit => 1003,
            Self::Combo => 1004,
            Self::SimulatePortfolio => 1005,
            Self::Positions => 1006,
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(kind: RequestKind, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: kind.id(),
            method: method.into(),
            params,
        }
    }

    /// Initial `client_signature` grant.
    pub fn auth_client_signature(
        client_id: &str,
        timestamp_ms: i64,
        signature: &str,
        nonce: &str,
        data: &str,
    ) -> Self {
        Self::new(
            RequestKind::Auth,
            "public/auth",
            serde_json::json!({
                "grant_type": "client_signature",
                "client_id": client_id,
                "timestamp": timestamp_ms,
                "signature": signature,
                "nonce": nonce,
                "data": data,
            }),
        )
    }

    /// `refresh_token` grant. Same id as the initial grant.
    pub fn auth_refresh(refresh_token: &str) -> Self {
        Self::new(
            RequestKind::Auth,
            "public/auth",
            serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }),
        )
    }

    pub fn set_heartbeat(interval_secs: u64) -> Self {
        Self::new(
            RequestKind::SetHeartbeat,
            "public/set_heartbeat",
            serde_json::json!({ "interval": interval_secs }),
        )
    }

    pub fn heartbeat_reply() -> Self {
        Self::new(RequestKind::HeartbeatReply, "public/test", serde_json::json!({}))
    }

    pub fn subscribe(channels: &[String]) -> Self {
        Self::new(
            RequestKind::Subscription,
            "private/subscribe",
            serde_json::json!({ "channels": channels }),
        )
    }

    pub fn unsubscribe(channels: &[String]) -> Self {
        Self::new(
            RequestKind::Subscription,
            "private/unsubscribe",
            serde_json::json!({ "channels": channels }),
        )
    }

    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_id(self.id)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Inbound frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WsMessage {
    /// Response to one of our requests (has `id`).
    Response(RpcResponse),
    /// Server push (has `method`).
    Notification(RpcNotification),
}

/// Response to a request.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
    /// Set by the exchange on its test network.
    #[serde(default)]
    pub testnet: bool,
}

impl RpcResponse {
    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_id(self.id)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into the result payload or the exchange error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match (self.error, self.result) {
            (Some(err), _) => Err(err),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Server push.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcNotification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcNotification {
    pub fn is_heartbeat(&self) -> bool {
        self.method == "heartbeat"
    }

    /// Channel payload of a `subscription` push.
    pub fn channel_message(&self) -> Option<ChannelMessage> {
        if self.method != "subscription" {
            return None;
        }
        let channel = self.params.get("channel")?.as_str()?.to_string();
        let data = self.params.get("data").cloned().unwrap_or(Value::Null);
        Some(ChannelMessage { channel, data })
    }
}

/// Data pushed on a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub channel: String,
    pub data: Value,
}

/// `public/auth` result.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}
