//! Spread executor.

use crate::error::{ExecutorError, ExecutorResult};
use crate::gate::ExecutionGate;
use skew_core::{CycleOutcome, OrderLabel, SkipReason, SpreadDirection};
use skew_feed::MarketState;
use skew_risk::{RiskBoard, SpreadLegs, SpreadTarget};
use skew_telemetry::Metrics;
use skew_ws::{OrderParams, SendError, WsWriteHandle};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why the spread was not fired.
#[derive(Debug, Clone, PartialEq)]
pub enum Blocked {
    Disabled,
    NoSpread,
    SpreadNotPositive { rr_iv: f64, rr_price: f64 },
    PrecheckFailed(SpreadDirection),
    LegsNotSelected,
}

impl std::fmt::Display for Blocked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "execution disabled"),
            Self::NoSpread => write!(f, "no spread published"),
            Self::SpreadNotPositive { rr_iv, rr_price } => {
                write!(f, "spread not positive (iv {rr_iv}, price {rr_price})")
            }
            Self::PrecheckFailed(direction) => write!(f, "{direction} margin pre-check not passed"),
            Self::LegsNotSelected => write!(f, "legs not selected"),
        }
    }
}

/// A completed fire.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub direction: SpreadDirection,
    pub label: OrderLabel,
    pub legs: SpreadLegs,
}

/// Fires the four-leg spread when every gate condition holds.
pub struct SpreadExecutor {
    target: SpreadTarget,
    state: Arc<MarketState>,
    board: Arc<RiskBoard>,
    gate: Arc<ExecutionGate>,
    handle: WsWriteHandle,
}

impl SpreadExecutor {
    pub fn new(
        target: SpreadTarget,
        state: Arc<MarketState>,
        board: Arc<RiskBoard>,
        gate: Arc<ExecutionGate>,
        handle: WsWriteHandle,
    ) -> Self {
        Self {
            target,
            state,
            board,
            gate,
            handle,
        }
    }

    pub fn gate(&self) -> &Arc<ExecutionGate> {
        &self.gate
    }

    /// Evaluate the gate conditions without consuming anything.
    pub fn check(&self) -> Result<SpreadLegs, Blocked> {
        if !self.gate.is_enabled() {
            return Err(Blocked::Disabled);
        }
        let spread = self.board.latest().ok_or(Blocked::NoSpread)?;
        if !(spread.rr_iv > 0.0 && spread.rr_price > 0.0) {
            return Err(Blocked::SpreadNotPositive {
                rr_iv: spread.rr_iv,
                rr_price: spread.rr_price,
            });
        }
        let direction = self.target.direction;
        if !self.board.precheck(direction) {
            return Err(Blocked::PrecheckFailed(direction));
        }
        self.target
            .resolve_legs(&self.state)
            .ok_or(Blocked::LegsNotSelected)
    }

    /// One evaluation: fire at most once per enable.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let legs = match self.check() {
            Ok(legs) => legs,
            Err(blocked) => {
                debug!(reason = %blocked, "Execution blocked");
                return CycleOutcome::skipped(SkipReason::GateClosed(blocked.to_string()));
            }
        };

        if !self.gate.try_consume() {
            return CycleOutcome::skipped(SkipReason::GateClosed(Blocked::Disabled.to_string()));
        }

        match self.fire(legs).await {
            Ok(report) => {
                info!(
                    direction = %report.direction,
                    label = %report.label,
                    "Risk-reversal executed"
                );
                CycleOutcome::Completed
            }
            Err(ExecutorError::LegFailed { source: SendError::ChannelClosed, .. }) => {
                CycleOutcome::Fatal("session writer closed during execution".to_string())
            }
            Err(e) => CycleOutcome::skipped(SkipReason::Failed(e.to_string())),
        }
    }

    /// Send the four legs in order. The gate must already be consumed.
    ///
    /// A failure stops submission; legs already sent stay in the market.
    async fn fire(&self, legs: SpreadLegs) -> ExecutorResult<ExecutionReport> {
        let direction = self.target.direction;
        let label = OrderLabel::new();
        let direction_label = direction.to_string();

        for (index, (instrument, side)) in legs.orders(direction).into_iter().enumerate() {
            let params = OrderParams::market(instrument, self.target.amount).with_label(label.as_str());
            if let Err(source) = self.handle.place_order(side, &params).await {
                error!(
                    %direction,
                    %label,
                    leg = index + 1,
                    sent = index,
                    instrument,
                    error = %source,
                    "Partial execution: remaining legs not sent, sent legs not rolled back"
                );
                Metrics::execution(&direction_label, false);
                return Err(ExecutorError::LegFailed {
                    leg: index + 1,
                    sent: index,
                    source,
                });
            }
        }

        Metrics::execution(&direction_label, true);
        Ok(ExecutionReport {
            direction,
            label,
            legs,
        })
    }
}
