//! Latest account responses kept for the status queries.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use skew_ws::{RequestKind, RpcError};
use std::fmt;

/// One entry of `private/get_positions`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Position {
    pub instrument_name: String,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub mark_price: f64,
    #[serde(default)]
    pub floating_profit_loss: f64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} (mark {}, pnl {})",
            self.instrument_name,
            self.direction,
            self.size,
            self.average_price,
            self.mark_price,
            self.floating_profit_loss
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionsSnapshot {
    pub received_at: DateTime<Utc>,
    pub positions: Vec<Position>,
}

/// Exchange answer to an order, cancel, edit or combo request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub kind: RequestKind,
    pub received_at: DateTime<Utc>,
    pub outcome: Result<Value, RpcError>,
}

impl OrderAck {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for OrderAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = request_label(self.kind);
        let at = self.received_at.format("%H:%M:%S");
        match &self.outcome {
            Ok(result) => {
                let order = result.get("order").unwrap_or(result);
                let id = order.get("order_id").and_then(Value::as_str).unwrap_or("-");
                let state = order.get("order_state").and_then(Value::as_str).unwrap_or("-");
                write!(f, "{kind} ok at {at}: order {id} {state}")
            }
            Err(e) => write!(f, "{kind} rejected at {at}: {e}"),
        }
    }
}

/// Metric and log label of a private request family.
pub fn request_label(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Auth => "auth",
        RequestKind::SetHeartbeat => "set_heartbeat",
        RequestKind::HeartbeatReply => "heartbeat_reply",
        RequestKind::Subscription => "subscription",
        RequestKind::Order => "order",
        RequestKind::Cancel => "cancel",
        RequestKind::Edit => "edit",
        RequestKind::Combo => "combo",
        RequestKind::SimulatePortfolio => "simulate_portfolio",
        RequestKind::Positions => "positions",
    }
}

/// Shared slots filled by the dispatcher.
#[derive(Debug, Default)]
pub struct AccountState {
    positions: RwLock<Option<PositionsSnapshot>>,
    last_order_ack: RwLock<Option<OrderAck>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        *self.positions.write() = Some(PositionsSnapshot {
            received_at: Utc::now(),
            positions,
        });
    }

    pub fn positions(&self) -> Option<PositionsSnapshot> {
        self.positions.read().clone()
    }

    pub fn record_order_ack(&self, ack: OrderAck) {
        *self.last_order_ack.write() = Some(ack);
    }

    pub fn last_order_ack(&self) -> Option<OrderAck> {
        self.last_order_ack.read().clone()
    }
}
