//! Inbound message dispatch.
//!
//! Consumes the session's forwarded messages strictly in arrival order.
//! Channel pushes go to ingest; responses fill the shared slots.

use crate::account::{request_label, AccountState, OrderAck, Position};
use chrono::Utc;
use serde_json::Value;
use skew_feed::Ingest;
use skew_risk::{PortfolioSimulation, RiskBoard};
use skew_telemetry::Metrics;
use skew_ws::{RequestKind, RpcNotification, RpcResponse, WsMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub struct Dispatcher {
    ingest: Ingest,
    board: Arc<RiskBoard>,
    account: Arc<AccountState>,
}

impl Dispatcher {
    pub fn new(ingest: Ingest, board: Arc<RiskBoard>, account: Arc<AccountState>) -> Self {
        Self {
            ingest,
            board,
            account,
        }
    }

    /// Drain `rx` until it closes or the token is cancelled.
    pub async fn run(self, mut rx: mpsc::Receiver<WsMessage>, token: CancellationToken) {
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
            }
        }
        debug!("Dispatcher stopped");
    }

    pub fn handle(&self, msg: WsMessage) {
        match msg {
            WsMessage::Notification(notification) => self.handle_notification(&notification),
            WsMessage::Response(response) => self.handle_response(response),
        }
    }

    fn handle_notification(&self, notification: &RpcNotification) {
        let Some(message) = notification.channel_message() else {
            trace!(method = %notification.method, "Ignoring notification");
            return;
        };
        match self.ingest.handle(&message) {
            Ok(report) => {
                if report.stored > 0 {
                    Metrics::rows_stored(report.stored);
                }
                for reason in &report.rejected {
                    Metrics::row_rejected(reason.as_str());
                }
            }
            Err(e) => warn!(channel = %message.channel, error = %e, "Failed to ingest push"),
        }
    }

    fn handle_response(&self, response: RpcResponse) {
        let Some(kind) = response.kind() else {
            debug!(id = response.id, "Response to unknown request id");
            return;
        };
        match kind {
            RequestKind::SimulatePortfolio => self.handle_simulation(response),
            RequestKind::Positions => self.handle_positions(response),
            RequestKind::Order | RequestKind::Cancel | RequestKind::Edit | RequestKind::Combo => {
                self.handle_order_ack(kind, response)
            }
            RequestKind::Subscription => match response.into_result() {
                Ok(channels) => info!(%channels, "Subscription acknowledged"),
                Err(e) => warn!(error = %e, "Subscription request rejected"),
            },
            other => debug!(kind = request_label(other), "Unhandled response"),
        }
    }

    fn handle_simulation(&self, response: RpcResponse) {
        let result = match response.into_result() {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Portfolio simulation rejected");
                self.board.simulation().reject();
                return;
            }
        };
        match PortfolioSimulation::from_result(&result) {
            Ok(simulation) => {
                debug!(
                    equity = simulation.equity,
                    projected_maintenance_margin = simulation.projected_maintenance_margin,
                    projected_initial_margin = simulation.projected_initial_margin,
                    margin_balance = simulation.margin_balance,
                    "Portfolio simulation received"
                );
                self.board.simulation().fill(simulation);
            }
            Err(e) => {
                warn!(error = %e, "Unreadable portfolio simulation");
                self.board.simulation().reject();
            }
        }
    }

    fn handle_positions(&self, response: RpcResponse) {
        let result = match response.into_result() {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Position query rejected");
                return;
            }
        };
        let entries = match result {
            Value::Array(entries) => entries,
            other => {
                warn!(result = %other, "Unexpected positions payload");
                return;
            }
        };
        let positions: Vec<Position> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(position) => Some(position),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable position");
                    None
                }
            })
            .collect();
        debug!(count = positions.len(), "Positions updated");
        self.account.set_positions(positions);
    }

    fn handle_order_ack(&self, kind: RequestKind, response: RpcResponse) {
        let label = request_label(kind);
        let outcome = response.into_result();
        match &outcome {
            Ok(result) => info!(kind = label, %result, "Order request acknowledged"),
            Err(e) => warn!(kind = label, code = e.code, message = %e.message, "Order request rejected"),
        }
        Metrics::order_response(label, outcome.is_ok());
        self.account.record_order_ack(OrderAck {
            kind,
            received_at: Utc::now(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skew_core::{Channels, Expiration};
    use skew_feed::MarketState;
    use skew_persistence::{JsonLinesStore, TickStore};

    struct Fixture {
        dispatcher: Dispatcher,
        board: Arc<RiskBoard>,
        account: Arc<AccountState>,
        state: Arc<MarketState>,
        store: Arc<JsonLinesStore>,
    }

    fn fixture() -> Fixture {
        let near = Expiration::parse("28MAR25").unwrap();
        let far = Expiration::parse("27JUN25").unwrap();
        let state = Arc::new(MarketState::new());
        let store = Arc::new(JsonLinesStore::in_memory());
        let ingest = Ingest::new(
            Channels::new("BTC"),
            &[near, far],
            &[],
            state.clone(),
            store.clone(),
        );
        let board = Arc::new(RiskBoard::new());
        let account = Arc::new(AccountState::new());
        Fixture {
            dispatcher: Dispatcher::new(ingest, board.clone(), account.clone()),
            board,
            account,
            state,
            store,
        }
    }

    fn parse(value: Value) -> WsMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_pushes_reach_ingest() {
        let f = fixture();
        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {
                "channel": "ticker.BTC-28MAR25.100ms",
                "data": { "instrument_name": "BTC-28MAR25", "mark_price": 100000.0, "timestamp": 1_740_000_000_000i64 }
            }
        })));
        assert_eq!(f.state.underlying("28MAR25"), Some(100_000.0));

        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": {
                "channel": "ticker.BTC-28MAR25-110000-C.100ms",
                "data": {
                    "instrument_name": "BTC-28MAR25-110000-C",
                    "timestamp": 1_740_000_001_000i64,
                    "best_bid_price": 0.01,
                    "best_ask_price": 0.012,
                    "bid_iv": 55.0,
                    "ask_iv": 57.0
                }
            }
        })));
        let expiry = Expiration::parse("28MAR25").unwrap().expiry_ts();
        assert_eq!(f.store.quotes_since(expiry, 0).len(), 1);
    }

    #[test]
    fn test_simulation_fills_slot() {
        let f = fixture();
        assert!(f.board.simulation().latest().is_none());
        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "id": 1005,
            "result": {
                "equity": 2.5,
                "projected_maintenance_margin": 0.4,
                "projected_initial_margin": 0.6,
                "margin_balance": 2.4,
                "total_pl": 0.01
            }
        })));
        let sim = f.board.simulation().latest().unwrap();
        assert_eq!(sim.equity, 2.5);
        assert_eq!(sim.total_pl, 0.01);
    }

    #[test]
    fn test_rejected_simulation_leaves_slot_empty() {
        let f = fixture();
        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "id": 1005,
            "error": { "code": 10000, "message": "authorization_required" }
        })));
        assert!(f.board.simulation().latest().is_none());
    }

    #[test]
    fn test_positions_slot() {
        let f = fixture();
        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "id": 1006,
            "result": [
                { "instrument_name": "BTC-28MAR25-90000-P", "size": -0.1, "direction": "sell" },
                { "instrument_name": "BTC-27JUN25-85000-P", "size": 0.1, "direction": "buy" }
            ]
        })));
        let snapshot = f.account.positions().unwrap();
        assert_eq!(snapshot.positions.len(), 2);
        assert_eq!(snapshot.positions[1].instrument_name, "BTC-27JUN25-85000-P");
    }

    #[test]
    fn test_order_responses_keep_last_ack() {
        let f = fixture();
        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "id": 1001,
            "result": { "order": { "order_id": "1", "order_state": "filled" }, "trades": [] }
        })));
        assert!(f.account.last_order_ack().unwrap().is_ok());

        f.dispatcher.handle(parse(json!({
            "jsonrpc": "2.0",
            "id": 1002,
            "error": { "code": 11044, "message": "not_open_order" }
        })));
        let ack = f.account.last_order_ack().unwrap();
        assert_eq!(ack.kind, RequestKind::Cancel);
        assert!(!ack.is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_when_sender_dropped() {
        let f = fixture();
        let (tx, rx) = mpsc::channel(4);
        tx.send(parse(json!({ "jsonrpc": "2.0", "id": 42, "result": ["markprice.options.btc_usd"] })))
            .await
            .unwrap();
        drop(tx);
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            f.dispatcher.run(rx, CancellationToken::new()),
        )
        .await
        .unwrap();
    }
}
