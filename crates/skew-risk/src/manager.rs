//! Periodic risk evaluation.

use crate::board::RiskBoard;
use crate::bounds::SpreadBounds;
use crate::config::RiskConfig;
use crate::error::{RiskError, RiskResult};
use crate::legs::SpreadTarget;
use crate::margin::MarginVerdict;
use crate::resample::{resample, ResampledSeries};
use crate::spread::{join_legs, spread_history, SpreadRow};
use chrono::Utc;
use skew_core::{CycleOutcome, OptionKind, OptionQuote, SkipReason};
use skew_feed::MarketState;
use skew_persistence::TickStore;
use skew_telemetry::Metrics;
use skew_ws::{SendError, WsWriteHandle};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Computes the spread and keeps the margin pre-check flag current.
pub struct RiskManager {
    config: RiskConfig,
    target: SpreadTarget,
    store: Arc<dyn TickStore>,
    state: Arc<MarketState>,
    board: Arc<RiskBoard>,
    handle: WsWriteHandle,
}

impl RiskManager {
    pub fn new(
        config: RiskConfig,
        target: SpreadTarget,
        store: Arc<dyn TickStore>,
        state: Arc<MarketState>,
        board: Arc<RiskBoard>,
        handle: WsWriteHandle,
    ) -> Self {
        Self {
            config,
            target,
            store,
            state,
            board,
            handle,
        }
    }

    pub fn board(&self) -> &Arc<RiskBoard> {
        &self.board
    }

    /// One risk cycle: spread first, then the margin pre-check.
    ///
    /// When the spread cannot be computed the direction's flag is cleared
    /// and no simulation is sent.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let now_ms = Utc::now().timestamp_millis();
        if let Err(e) = self.update_spread(now_ms) {
            self.board.set_precheck(self.target.direction, false);
            match &e {
                RiskError::InsufficientData(_) => debug!(error = %e, "Spread unavailable"),
                _ => warn!(error = %e, "Spread computation failed"),
            }
            return CycleOutcome::skipped(e.into());
        }
        self.margin_check().await
    }

    /// Recompute the spread history and publish its latest row.
    pub fn update_spread(&self, now_ms: i64) -> RiskResult<SpreadRow> {
        let since = now_ms.saturating_sub(self.config.lookback_ms());
        let near = self.store.quotes_since(self.target.near.expiry_ts(), since);
        let far = self.store.quotes_since(self.target.far.expiry_ts(), since);

        let step = self.config.resample_ms();
        let series = |rows: &[OptionQuote], kind: OptionKind| -> ResampledSeries {
            resample(rows.iter().filter(|q| q.kind == kind), step)
        };
        let joined = join_legs(
            &series(&far, OptionKind::Call),
            &series(&far, OptionKind::Put),
            &series(&near, OptionKind::Call),
            &series(&near, OptionKind::Put),
        );
        let history = spread_history(self.target.direction, &joined);
        let latest = *history.last().ok_or_else(|| {
            RiskError::InsufficientData(format!(
                "no complete spread rows ({} near, {} far quotes)",
                near.len(),
                far.len()
            ))
        })?;

        let iv_history: Vec<f64> = history.iter().map(|row| row.rr_iv).collect();
        let bounds = SpreadBounds::from_values(&iv_history, self.config.bound_std_multiplier);
        self.board.publish(latest, bounds);
        Metrics::rr_spread(latest.rr_iv, latest.rr_price);
        if let Some(legs) = joined.iter().rev().find(|legs| legs.timestamp_ms == latest.timestamp_ms) {
            let mids = legs.mids();
            self.board.publish_mids(mids);
            debug!(
                far_call_iv = mids.far_call.iv,
                far_put_iv = mids.far_put.iv,
                near_call_iv = mids.near_call.iv,
                near_put_iv = mids.near_put.iv,
                far_call_price = mids.far_call.price,
                far_put_price = mids.far_put.price,
                near_call_price = mids.near_call.price,
                near_put_price = mids.near_put.price,
                "Leg mids"
            );
        }

        info!(
            direction = %self.target.direction,
            rr_iv = latest.rr_iv,
            rr_price = latest.rr_price,
            rows = history.len(),
            lower = bounds.map(|b| b.lower),
            upper = bounds.map(|b| b.upper),
            "Risk-reversal spread"
        );
        Ok(latest)
    }

    /// Simulate the candidate legs and set the direction's pre-check flag.
    pub async fn margin_check(&self) -> CycleOutcome {
        let direction = self.target.direction;
        let Some(legs) = self.target.resolve_legs(&self.state) else {
            self.board.set_precheck(direction, false);
            return CycleOutcome::skipped(SkipReason::NotReady("legs not selected".to_string()));
        };

        let slot = self.board.simulation();
        slot.begin();
        let positions = legs.simulated_positions(direction, self.target.amount);
        if let Err(e) = self
            .handle
            .simulate_portfolio(self.target.currency(), &positions)
            .await
        {
            slot.abandon();
            self.board.set_precheck(direction, false);
            return match e {
                SendError::ChannelClosed => CycleOutcome::Fatal("session writer closed".to_string()),
                SendError::NotReady => {
                    CycleOutcome::skipped(SkipReason::NotReady("session not ready".to_string()))
                }
                SendError::Encode(e) => CycleOutcome::skipped(SkipReason::Failed(e)),
            };
        }

        let simulation = slot.wait(self.config.simulation_wait()).await;
        let verdict = MarginVerdict::evaluate(simulation.as_ref(), self.config.maintenance_margin_multiplier);
        let passed = verdict.passed();
        self.board.set_precheck(direction, passed);
        Metrics::margin_check(&direction.to_string(), passed);

        if passed {
            info!(%direction, "Margin pre-check passed");
        } else {
            warn!(%direction, %verdict, "Margin pre-check failed");
        }
        CycleOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::margin::PortfolioSimulation;
    use parking_lot::RwLock;
    use rust_decimal_macros::dec;
    use skew_core::{Channels, Expiration, LegPair, SpreadDirection, Strike};
    use skew_persistence::JsonLinesStore;
    use skew_ws::{SessionState, WsOutbound};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const NOW_MS: i64 = 1_740_000_000_000;

    fn near() -> Expiration {
        Expiration::parse("28MAR25").unwrap()
    }

    fn far() -> Expiration {
        Expiration::parse("27JUN25").unwrap()
    }

    fn quote(ts: i64, exp: &Expiration, kind: OptionKind, strike: Strike, bid: f64, ask: f64) -> OptionQuote {
        OptionQuote {
            timestamp_ms: ts,
            instrument: Channels::new("BTC").option_instrument(exp, strike, kind),
            expiration_ts: exp.expiry_ts(),
            kind,
            strike,
            bid_price: Some(bid / 1000.0),
            ask_price: Some(ask / 1000.0),
            bid_iv: Some(bid),
            ask_iv: Some(ask),
            underlying_price: 100_000.0,
            log_moneyness: (strike as f64 / 100_000.0).ln(),
            delta: None,
            vega: None,
            theta: None,
        }
    }

    /// Quotes for one minute where the SHORT spread is positive.
    fn seeded_store() -> Arc<JsonLinesStore> {
        let store = Arc::new(JsonLinesStore::in_memory());
        let start = NOW_MS - 60_000;
        for i in 0..6 {
            let ts = start + i * 10_000;
            let drift = i as f64 * 0.1;
            store.insert_quote(&quote(ts, &far(), OptionKind::Call, 115_000, 55.0 + drift, 56.0)).unwrap();
            store.insert_quote(&quote(ts, &far(), OptionKind::Put, 85_000, 50.0, 51.0)).unwrap();
            store.insert_quote(&quote(ts, &near(), OptionKind::Call, 110_000, 47.0, 48.0)).unwrap();
            store.insert_quote(&quote(ts, &near(), OptionKind::Put, 90_000, 54.0, 55.0)).unwrap();
        }
        store
    }

    fn target() -> SpreadTarget {
        SpreadTarget {
            channels: Channels::new("BTC"),
            near: near(),
            far: far(),
            direction: SpreadDirection::Short,
            amount: dec!(0.1),
        }
    }

    fn manager(
        config: RiskConfig,
        store: Arc<JsonLinesStore>,
        state: Arc<MarketState>,
    ) -> (RiskManager, mpsc::Receiver<WsOutbound>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = WsWriteHandle::new(tx, Arc::new(RwLock::new(SessionState::Ready)));
        let manager = RiskManager::new(config, target(), store, state, Arc::new(RiskBoard::new()), handle);
        (manager, rx)
    }

    fn selected_state() -> Arc<MarketState> {
        let state = Arc::new(MarketState::new());
        state.set_legs("28MAR25", LegPair { call: 110_000, put: 90_000 });
        state.set_legs("27JUN25", LegPair { call: 115_000, put: 85_000 });
        state
    }

    #[test]
    fn test_update_spread_publishes_latest() {
        let (manager, _rx) = manager(RiskConfig::default(), seeded_store(), selected_state());
        let latest = manager.update_spread(NOW_MS).unwrap();
        // far: (55 + drift) - 51, near: 54 - 48.
        assert!(latest.rr_iv > 0.0);
        assert!(latest.rr_price > 0.0);
        assert_eq!(manager.board().latest(), Some(latest));
        assert!(manager.board().bounds().is_some());

        let mids = manager.board().snapshot().mids.unwrap();
        assert_eq!(mids.timestamp_ms, latest.timestamp_ms);
        assert!((mids.near_put.iv.unwrap() - 54.5).abs() < 1e-9);
        assert!((mids.near_call.price.unwrap() - 0.0475).abs() < 1e-12);
    }

    #[test]
    fn test_update_spread_without_quotes() {
        let store = Arc::new(JsonLinesStore::in_memory());
        let (manager, _rx) = manager(RiskConfig::default(), store, selected_state());
        assert!(matches!(
            manager.update_spread(NOW_MS),
            Err(RiskError::InsufficientData(_))
        ));
        assert!(manager.board().latest().is_none());
    }

    #[tokio::test]
    async fn test_margin_check_without_legs_stays_closed() {
        let (manager, mut rx) = manager(RiskConfig::default(), seeded_store(), Arc::new(MarketState::new()));
        let outcome = manager.margin_check().await;
        assert!(matches!(outcome, CycleOutcome::Skipped(SkipReason::NotReady(_))));
        assert!(!manager.board().precheck(SpreadDirection::Short));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_margin_check_without_response_fails_closed() {
        let config = RiskConfig {
            simulation_wait_secs: 0,
            ..Default::default()
        };
        let (manager, mut rx) = manager(config, seeded_store(), selected_state());
        manager.board().set_precheck(SpreadDirection::Short, true);

        assert_eq!(manager.margin_check().await, CycleOutcome::Completed);
        assert!(!manager.board().precheck(SpreadDirection::Short));

        let sent = rx.try_recv().unwrap();
        assert_eq!(sent.id, 1005);
        let payload: serde_json::Value = serde_json::from_str(&sent.payload).unwrap();
        let positions = &payload["params"]["simulated_positions"];
        assert_eq!(positions["BTC-27JUN25-115000-C"], -0.1);
        assert_eq!(positions["BTC-28MAR25-90000-P"], -0.1);
        assert_eq!(positions["BTC-28MAR25-110000-C"], 0.1);
    }

    #[tokio::test]
    async fn test_margin_check_passes_with_healthy_simulation() {
        let (manager, mut rx) = manager(RiskConfig::default(), seeded_store(), selected_state());
        let board = manager.board().clone();
        let responder = tokio::spawn(async move {
            let sent = rx.recv().await.unwrap();
            assert_eq!(sent.id, 1005);
            board.simulation().fill(PortfolioSimulation {
                equity: 2.0,
                projected_maintenance_margin: 0.5,
                projected_initial_margin: 0.8,
                margin_balance: 1.0,
                total_pl: 0.0,
            });
        });

        assert_eq!(manager.margin_check().await, CycleOutcome::Completed);
        responder.await.unwrap();
        assert!(manager.board().precheck(SpreadDirection::Short));
        assert!(!manager.board().precheck(SpreadDirection::Long));
    }

    #[tokio::test]
    async fn test_stale_simulation_is_not_reused() {
        let config = RiskConfig {
            simulation_wait_secs: 0,
            ..Default::default()
        };
        let (manager, _rx) = manager(config, seeded_store(), selected_state());
        manager.board().simulation().fill(PortfolioSimulation {
            equity: 2.0,
            projected_maintenance_margin: 0.5,
            projected_initial_margin: 0.8,
            margin_balance: 1.0,
            total_pl: 0.0,
        });
        manager.margin_check().await;
        assert!(!manager.board().precheck(SpreadDirection::Short));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_does_not_decide_next_cycle() {
        let (manager, mut rx) = manager(RiskConfig::default(), seeded_store(), selected_state());

        // First request goes unanswered until its wait elapses.
        assert_eq!(manager.margin_check().await, CycleOutcome::Completed);
        assert!(!manager.board().precheck(SpreadDirection::Short));

        let board = manager.board().clone();
        let responder = tokio::spawn(async move {
            rx.recv().await.unwrap();
            rx.recv().await.unwrap();
            // The late, healthy reply to the first request lands first.
            board.simulation().fill(PortfolioSimulation {
                equity: 2.0,
                projected_maintenance_margin: 0.5,
                projected_initial_margin: 0.8,
                margin_balance: 1.0,
                total_pl: 0.0,
            });
            board.simulation().fill(PortfolioSimulation {
                equity: 0.5,
                projected_maintenance_margin: 0.5,
                projected_initial_margin: 0.8,
                margin_balance: 1.0,
                total_pl: 0.0,
            });
        });

        assert_eq!(manager.margin_check().await, CycleOutcome::Completed);
        responder.await.unwrap();
        assert!(!manager.board().precheck(SpreadDirection::Short));
        assert_eq!(manager.board().simulation().latest().map(|s| s.equity), Some(0.5));
    }
}
