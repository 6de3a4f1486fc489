//! WebSocket write handle for sending requests.
//!
//! Sends are fire-and-forget: a successful call only means the request was
//! queued for the session's writer. Responses come back through the inbound
//! message stream and are matched by request id.

use crate::connection::SessionState;
use crate::message::{JsonRpcRequest, RequestKind};
use crate::requests::{ComboLeg, OrderParams, SimulatedPositions};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use skew_core::OrderSide;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Request queued for the session writer.
#[derive(Debug)]
pub struct WsOutbound {
    /// Reserved request id.
    pub id: u64,
    /// Encoded JSON-RPC request.
    pub payload: String,
}

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Session is not `Ready`.
    NotReady,
    /// Channel closed (session ended or shutting down).
    ChannelClosed,
    /// Request could not be encoded.
    Encode(String),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "session not ready"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::Encode(e) => write!(f, "encode failed: {e}"),
        }
    }
}

impl std::error::Error for SendError {}

impl From<serde_json::Error> for SendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encode(e.to_string())
    }
}

/// Cloneable handle for sending requests on the session.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsOutbound>,
    state: Arc<RwLock<SessionState>>,
}

impl WsWriteHandle {
    pub fn new(tx: mpsc::Sender<WsOutbound>, state: Arc<RwLock<SessionState>>) -> Self {
        Self { tx, state }
    }

    /// Queue a JSON-RPC request.
    ///
    /// # Errors
    ///
    /// - `SendError::NotReady`: Session is not authenticated
    /// - `SendError::ChannelClosed`: Session writer is gone
    pub async fn send_request(&self, request: &JsonRpcRequest) -> Result<(), SendError> {
        if !self.is_ready() {
            return Err(SendError::NotReady);
        }

        let payload = serde_json::to_string(request)?;
        self.tx
            .send(WsOutbound {
                id: request.id,
                payload,
            })
            .await
            .map_err(|_| SendError::ChannelClosed)?;

        debug!(id = request.id, method = %request.method, "Request queued");
        Ok(())
    }

    pub async fn subscribe(&self, channels: &[String]) -> Result<(), SendError> {
        if channels.is_empty() {
            return Ok(());
        }
        info!(count = channels.len(), ?channels, "Subscribing");
        self.send_request(&JsonRpcRequest::subscribe(channels)).await
    }

    pub async fn unsubscribe(&self, channels: &[String]) -> Result<(), SendError> {
        if channels.is_empty() {
            return Ok(());
        }
        info!(count = channels.len(), ?channels, "Unsubscribing");
        self.send_request(&JsonRpcRequest::unsubscribe(channels)).await
    }

    /// `private/buy` or `private/sell`.
    pub async fn place_order(&self, side: OrderSide, params: &OrderParams) -> Result<(), SendError> {
        let request = JsonRpcRequest::order(side, params)?;
        info!(
            %side,
            instrument = %params.instrument_name,
            amount = %params.amount,
            price = ?params.price,
            "Order sent"
        );
        self.send_request(&request).await
    }

    pub async fn cancel(&self, order_id: &str) -> Result<(), SendError> {
        info!(order_id, "Cancel sent");
        self.send_request(&JsonRpcRequest::cancel(order_id)).await
    }

    pub async fn edit(&self, order_id: &str, price: Option<Decimal>, amount: Option<Decimal>) -> Result<(), SendError> {
        info!(order_id, ?price, ?amount, "Edit sent");
        self.send_request(&JsonRpcRequest::edit(order_id, price, amount))
            .await
    }

    pub async fn create_combo(&self, legs: &[ComboLeg]) -> Result<(), SendError> {
        info!(legs = legs.len(), "Combo order sent");
        self.send_request(&JsonRpcRequest::create_combo(legs)?).await
    }

    pub async fn simulate_portfolio(&self, currency: &str, positions: &SimulatedPositions) -> Result<(), SendError> {
        debug!(currency, positions = positions.len(), "Portfolio simulation requested");
        self.send_request(&JsonRpcRequest::simulate_portfolio(currency, positions)?)
            .await
    }

    pub async fn get_positions(&self, currency: &str, kind: &str) -> Result<(), SendError> {
        self.send_request(&JsonRpcRequest::get_positions(currency, kind))
            .await
    }

    /// Ready to send private requests.
    pub fn is_ready(&self) -> bool {
        *self.state.read() == SessionState::Ready && !self.tx.is_closed()
    }

    pub fn session_state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl WsOutbound {
    /// Request family of the queued frame.
    pub fn kind(&self) -> Option<RequestKind> {
        RequestKind::from_id(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_handle(state: SessionState) -> (WsWriteHandle, mpsc::Receiver<WsOutbound>) {
        let (tx, rx) = mpsc::channel(100);
        let handle = WsWriteHandle::new(tx, Arc::new(RwLock::new(state)));
        (handle, rx)
    }

    fn payload(msg: WsOutbound) -> serde_json::Value {
        serde_json::from_str(&msg.payload).unwrap()
    }

    #[tokio::test]
    async fn test_send_request_success() {
        let (handle, mut rx) = create_test_handle(SessionState::Ready);

        tokio_test::assert_ok!(handle.cancel("order-1").await);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind(), Some(RequestKind::Cancel));
        let value = payload(msg);
        assert_eq!(value["method"], "private/cancel");
    }

    #[tokio::test]
    async fn test_not_ready_before_authentication() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Authenticating,
            SessionState::Closing,
        ] {
            let (handle, _rx) = create_test_handle(state);
            let result = handle.get_positions("BTC", "option").await;
            assert_eq!(result, Err(SendError::NotReady), "state {state:?}");
        }
    }

    #[tokio::test]
    async fn test_channel_closed() {
        let (handle, rx) = create_test_handle(SessionState::Ready);
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.is_ready());
        let result = handle.cancel("x").await;
        assert_eq!(result, Err(SendError::NotReady));
    }

    #[tokio::test]
    async fn test_place_order_queues_payload() {
        let (handle, mut rx) = create_test_handle(SessionState::Ready);
        let params = OrderParams::market("BTC-28MAR25-110000-C", dec!(0.1));

        handle.place_order(OrderSide::Buy, &params).await.unwrap();

        let value = payload(rx.recv().await.unwrap());
        assert_eq!(value["id"], 1001);
        assert_eq!(value["method"], "private/buy");
        assert_eq!(value["params"]["amount"], 0.1);
    }

    #[tokio::test]
    async fn test_empty_subscription_is_noop() {
        let (handle, mut rx) = create_test_handle(SessionState::Ready);
        handle.subscribe(&[]).await.unwrap();
        handle.unsubscribe(&[]).await.unwrap();
        assert!(rx.try_recv().is_err());

        handle
            .subscribe(&["ticker.BTC-28MAR25-110000-C.100ms".to_string()])
            .await
            .unwrap();
        let value = payload(rx.recv().await.unwrap());
        assert_eq!(value["method"], "private/subscribe");
        assert_eq!(handle.session_state(), SessionState::Ready);
    }
}
