//! Exchange session manager.
//!
//! Owns the single WebSocket connection and drives it through
//! `Disconnected → Connecting → Authenticating → Ready → Closing → Disconnected`.
//!
//! There is no reconnect: any connection loss, authentication rejection or
//! heartbeat silence ends `run()` with an error and cancels the shared
//! shutdown token so every dependent task exits.

use crate::auth::{RefreshPolicy, SessionTokens};
use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::{AuthResult, JsonRpcRequest, RequestKind, RpcResponse, WsMessage};
use crate::signer::{generate_nonce, AuthSigner};
use crate::subscription::SubscriptionManager;
use crate::ws_write_handle::{WsOutbound, WsWriteHandle};
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Server heartbeat interval requested after authentication.
    pub heartbeat_interval: Duration,
    /// Dead after `heartbeat_interval * heartbeat_timeout_multiplier` of silence.
    pub heartbeat_timeout_multiplier: u32,
    /// How often the token refresh deadline is checked.
    pub refresh_check_interval: Duration,
    pub refresh_policy: RefreshPolicy,
    /// Maximum wait for the auth response.
    pub auth_timeout: Duration,
    /// Channels subscribed once the session is ready.
    pub always_on_channels: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout_multiplier: 3,
            refresh_check_interval: Duration::from_secs(5),
            refresh_policy: RefreshPolicy::default(),
            auth_timeout: Duration::from_secs(10),
            always_on_channels: Vec::new(),
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials used for the `client_signature` grant.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub signer: Arc<AuthSigner>,
}

/// Exchange session manager.
pub struct SessionManager {
    config: SessionConfig,
    credentials: Credentials,
    state: Arc<RwLock<SessionState>>,
    tokens: Arc<RwLock<Option<SessionTokens>>>,
    subscriptions: Arc<SubscriptionManager>,
    heartbeat: Arc<HeartbeatMonitor>,
    /// Inbound messages for the application dispatcher.
    message_tx: mpsc::Sender<WsMessage>,
    /// Outbound request sender (for WsWriteHandle).
    outbound_tx: mpsc::Sender<WsOutbound>,
    /// Outbound request receiver (consumed by message loop).
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<WsOutbound>>>,
    shutdown_token: CancellationToken,
}

impl SessionManager {
    pub fn new(config: SessionConfig, credentials: Credentials, message_tx: mpsc::Sender<WsMessage>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        Self {
            subscriptions: Arc::new(SubscriptionManager::with_always_on(
                config.always_on_channels.iter().cloned(),
            )),
            heartbeat: Arc::new(HeartbeatMonitor::new(
                config.heartbeat_interval,
                config.heartbeat_timeout_multiplier,
            )),
            config,
            credentials,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            tokens: Arc::new(RwLock::new(None)),
            message_tx,
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    /// Cloneable handle for sending requests.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(self.outbound_tx.clone(), self.state.clone())
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.read().is_some()
    }

    pub fn subscriptions(&self) -> Arc<SubscriptionManager> {
        self.subscriptions.clone()
    }

    pub fn heartbeat(&self) -> Arc<HeartbeatMonitor> {
        self.heartbeat.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("SessionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            info!(from = %previous, to = %state, "Session state changed");
        }
    }

    /// Connect, authenticate and run the message loop until shutdown or failure.
    ///
    /// Returns `Ok(())` only for a requested shutdown. Every other exit is an
    /// error and cancels the shutdown token.
    pub async fn run(&self) -> WsResult<()> {
        let result = match self.run_session().await {
            Err(WsError::ShutdownRequested) => Ok(()),
            other => other,
        };

        self.set_state(SessionState::Disconnected);
        *self.tokens.write() = None;

        if let Err(e) = &result {
            error!(error = %e, "Session terminated");
            self.shutdown_token.cancel();
        }
        result
    }

    async fn run_session(&self) -> WsResult<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(WsError::ShutdownRequested);
        }

        self.set_state(SessionState::Connecting);
        info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async_tls_with_config(&self.config.url, None, true, None)
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();
        self.heartbeat.reset();

        self.set_state(SessionState::Authenticating);
        let auth = self.auth_request()?;
        write.send(Message::Text(serde_json::to_string(&auth)?)).await?;
        self.await_authentication(&mut write, &mut read).await?;

        self.set_state(SessionState::Ready);

        let heartbeat = JsonRpcRequest::set_heartbeat(self.heartbeat.interval().as_secs());
        write.send(Message::Text(serde_json::to_string(&heartbeat)?)).await?;

        let channels: Vec<String> = self.subscriptions.always_on().into_iter().collect();
        if !channels.is_empty() {
            info!(count = channels.len(), ?channels, "Subscribing always-on channels");
            let subscribe = JsonRpcRequest::subscribe(&channels);
            write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
        }

        self.message_loop(&mut write, &mut read).await
    }

    fn auth_request(&self) -> WsResult<JsonRpcRequest> {
        let timestamp_ms = Utc::now().timestamp_millis();
        let nonce = generate_nonce();
        let data = "";
        let signature = self.credentials.signer.sign(timestamp_ms, &nonce, data)?;
        Ok(JsonRpcRequest::auth_client_signature(
            &self.credentials.client_id,
            timestamp_ms,
            &signature,
            &nonce,
            data,
        ))
    }

    /// Read until the auth response arrives. Other frames are handled normally.
    async fn await_authentication(&self, write: &mut WsSink, read: &mut WsSource) -> WsResult<()> {
        let deadline = tokio::time::Instant::now() + self.config.auth_timeout;

        while !self.is_authenticated() {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    return Err(WsError::ShutdownRequested);
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Err(WsError::AuthTimeout(self.config.auth_timeout.as_secs()));
                }
                msg = read.next() => {
                    self.handle_frame(msg, write).await?;
                }
            }
        }
        Ok(())
    }

    async fn message_loop(&self, write: &mut WsSink, read: &mut WsSource) -> WsResult<()> {
        let mut refresh_tick = tokio::time::interval(self.config.refresh_check_interval);
        refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness_tick = tokio::time::interval(self.heartbeat.interval());
        liveness_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    self.set_state(SessionState::Closing);
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Err(WsError::ShutdownRequested);
                }

                msg = read.next() => {
                    self.handle_frame(msg, write).await?;
                }

                outbound = outbound_recv => {
                    if let Some(WsOutbound { id, payload }) = outbound {
                        write.send(Message::Text(payload)).await?;
                        debug!(id, "Request sent");
                    }
                }

                _ = refresh_tick.tick() => {
                    if let Some(request) = self.refresh_request_if_due() {
                        write.send(Message::Text(serde_json::to_string(&request)?)).await?;
                    }
                }

                _ = liveness_tick.tick() => {
                    if self.heartbeat.is_stale() {
                        return Err(WsError::HeartbeatTimeout(self.heartbeat.timeout().as_secs()));
                    }
                }
            }
        }
    }

    /// Handle one item from the read half.
    async fn handle_frame(
        &self,
        msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        write: &mut WsSink,
    ) -> WsResult<()> {
        match msg {
            Some(Ok(Message::Text(text))) => {
                if let Some(reply) = self.handle_text_message(&text).await? {
                    // Answer before reading the next frame.
                    write.send(Message::Text(reply)).await?;
                }
            }
            Some(Ok(Message::Ping(data))) => {
                self.heartbeat.record_message();
                write.send(Message::Pong(data)).await?;
            }
            Some(Ok(Message::Pong(_))) => {
                self.heartbeat.record_message();
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (f.code.into(), f.reason.to_string()))
                    .unwrap_or((1000, "Normal close".to_string()));
                warn!(code, %reason, "WebSocket closed by server");
                return Err(WsError::ConnectionClosed { code, reason });
            }
            Some(Err(e)) => {
                error!(?e, "WebSocket read error");
                return Err(e.into());
            }
            None => {
                return Err(WsError::ConnectionClosed {
                    code: 1006,
                    reason: "stream ended".to_string(),
                });
            }
            Some(Ok(_)) => {}
        }
        Ok(())
    }

    /// Route one text frame. Returns a reply that must be written immediately.
    async fn handle_text_message(&self, text: &str) -> WsResult<Option<String>> {
        self.heartbeat.record_message();

        let msg: WsMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Dropping unparseable frame");
                return Ok(None);
            }
        };

        match &msg {
            WsMessage::Notification(notification) if notification.is_heartbeat() => {
                self.heartbeat.record_test_request();
                let reply = serde_json::to_string(&JsonRpcRequest::heartbeat_reply())?;
                return Ok(Some(reply));
            }
            WsMessage::Response(response) => match response.kind() {
                Some(RequestKind::Auth) => {
                    self.handle_auth_response(response)?;
                    return Ok(None);
                }
                Some(RequestKind::SetHeartbeat) => {
                    match &response.error {
                        Some(err) => warn!(%err, "set_heartbeat rejected"),
                        None => info!(
                            interval_secs = self.heartbeat.interval().as_secs(),
                            "Server heartbeat established"
                        ),
                    }
                    return Ok(None);
                }
                Some(RequestKind::HeartbeatReply) => {
                    self.heartbeat.record_reply_ack();
                    return Ok(None);
                }
                _ => {}
            },
            WsMessage::Notification(_) => {}
        }

        if self.message_tx.send(msg).await.is_err() {
            warn!("Message receiver dropped");
        }
        Ok(None)
    }

    /// Auth and refresh share one id, so one handler covers both.
    fn handle_auth_response(&self, response: &RpcResponse) -> WsResult<()> {
        let testnet = response.testnet;
        let result = response
            .clone()
            .into_result()
            .map_err(|e| WsError::AuthRejected(e.to_string()))?;
        let auth: AuthResult = serde_json::from_value(result)
            .map_err(|e| WsError::ParseError(format!("auth result: {e}")))?;

        let refreshed = self.is_authenticated();
        let tokens = SessionTokens::from_auth(auth, Utc::now(), testnet, &self.config.refresh_policy);
        info!(
            refreshed,
            testnet,
            refresh_deadline = %tokens.refresh_deadline(),
            "Session authenticated"
        );
        *self.tokens.write() = Some(tokens);
        Ok(())
    }

    fn refresh_request_if_due(&self) -> Option<JsonRpcRequest> {
        let tokens = self.tokens.read();
        let tokens = tokens.as_ref()?;
        if !tokens.refresh_due(Utc::now()) {
            return None;
        }
        info!(deadline = %tokens.refresh_deadline(), "Refreshing access token");
        Some(JsonRpcRequest::auth_refresh(tokens.refresh_token()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use serde_json::json;

    fn test_manager() -> (SessionManager, mpsc::Receiver<WsMessage>) {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let credentials = Credentials {
            client_id: "client".to_string(),
            signer: Arc::new(AuthSigner::from_key(key)),
        };
        let (tx, rx) = mpsc::channel(16);
        let config = SessionConfig {
            always_on_channels: vec!["markprice.options.btc_usd".to_string()],
            ..SessionConfig::default()
        };
        (SessionManager::new(config, credentials, tx), rx)
    }

    fn auth_frame(testnet: bool) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 9929,
            "result": { "access_token": "at", "refresh_token": "rt", "expires_in": 900 },
            "testnet": testnet
        })
        .to_string()
    }

    #[test]
    fn test_initial_state() {
        let (manager, _rx) = test_manager();
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(!manager.is_authenticated());
        assert!(!manager.write_handle().is_ready());
        assert!(manager.subscriptions().is_subscribed("markprice.options.btc_usd"));
    }

    #[test]
    fn test_auth_request_is_signed() {
        let (manager, _rx) = test_manager();
        let request = manager.auth_request().unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], 9929);
        assert_eq!(value["params"]["grant_type"], "client_signature");
        assert_eq!(value["params"]["client_id"], "client");
        assert_eq!(value["params"]["nonce"].as_str().unwrap().len(), 32);
        assert!(!value["params"]["signature"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_response_stores_tokens() {
        let (manager, mut rx) = test_manager();
        let reply = manager.handle_text_message(&auth_frame(false)).await.unwrap();
        assert!(reply.is_none());
        assert!(manager.is_authenticated());
        // Auth responses are consumed by the session
        assert!(rx.try_recv().is_err());
        // Deadline 660s out, nothing due yet
        assert!(manager.refresh_request_if_due().is_none());
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal() {
        let (manager, _rx) = test_manager();
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 9929,
            "error": { "code": 13004, "message": "invalid_credentials" }
        })
        .to_string();
        let result = manager.handle_text_message(&frame).await;
        assert!(matches!(result, Err(WsError::AuthRejected(_))));
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_heartbeat_test_request_gets_immediate_reply() {
        let (manager, mut rx) = test_manager();
        let request = json!({
            "jsonrpc": "2.0",
            "method": "heartbeat",
            "params": { "type": "test_request" }
        })
        .to_string();

        let reply = manager.handle_text_message(&request).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["id"], 8212);
        assert_eq!(value["method"], "public/test");
        assert_eq!(manager.heartbeat().test_request_count(), 1);
        // Test requests are not forwarded
        assert!(rx.try_recv().is_err());

        let ack = json!({ "jsonrpc": "2.0", "id": 8212, "result": { "version": "1.2.26" } }).to_string();
        assert!(manager.handle_text_message(&ack).await.unwrap().is_none());
        assert_eq!(manager.heartbeat().reply_ack_count(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pushes_and_other_responses_are_forwarded() {
        let (manager, mut rx) = test_manager();
        let push = json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": { "channel": "ticker.BTC-28MAR25.100ms", "data": { "mark_price": 1.0 } }
        })
        .to_string();
        manager.handle_text_message(&push).await.unwrap();
        assert!(matches!(rx.try_recv().unwrap(), WsMessage::Notification(_)));

        let sim = json!({ "jsonrpc": "2.0", "id": 1005, "result": { "equity": 1.0 } }).to_string();
        manager.handle_text_message(&sim).await.unwrap();
        match rx.try_recv().unwrap() {
            WsMessage::Response(resp) => assert_eq!(resp.kind(), Some(RequestKind::SimulatePortfolio)),
            _ => panic!("expected response"),
        }
    }

    #[tokio::test]
    async fn test_garbage_frame_is_dropped() {
        let (manager, mut rx) = test_manager();
        assert!(manager.handle_text_message("not json").await.unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_testnet_refresh_deadline() {
        let (manager, _rx) = test_manager();
        manager.handle_text_message(&auth_frame(true)).await.unwrap();
        let deadline = manager.tokens.read().as_ref().unwrap().refresh_deadline();
        let secs = (deadline - Utc::now()).num_seconds();
        assert!((298..=300).contains(&secs), "deadline {secs}s");
    }

    #[tokio::test]
    async fn test_refresh_due_builds_refresh_request() {
        let (manager, _rx) = test_manager();
        let frame = json!({
            "jsonrpc": "2.0",
            "id": 9929,
            "result": { "access_token": "at", "refresh_token": "rt-1", "expires_in": 10 }
        })
        .to_string();
        manager.handle_text_message(&frame).await.unwrap();

        let request = manager.refresh_request_if_due().unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], 9929);
        assert_eq!(value["params"]["grant_type"], "refresh_token");
        assert_eq!(value["params"]["refresh_token"], "rt-1");
    }

    #[tokio::test]
    async fn test_run_against_unreachable_url_is_fatal() {
        let (manager, _rx) = test_manager();
        let manager = SessionManager {
            config: SessionConfig {
                url: "ws://127.0.0.1:1".to_string(),
                ..manager.config.clone()
            },
            ..manager
        };
        let token = manager.shutdown_token();

        let result = manager.run().await;
        assert!(matches!(result, Err(WsError::ConnectionFailed(_))));
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(token.is_cancelled(), "connection loss must signal shutdown");
    }
}
