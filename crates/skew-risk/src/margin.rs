//! Margin pre-check against a simulated portfolio.
//!
//! The check passes only if a simulation result exists, equity covers the
//! projected maintenance margin times the safety multiplier, and the margin
//! balance covers the projected initial margin.

use crate::error::{RiskError, RiskResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Margin figures of `private/simulate_portfolio`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSimulation {
    pub equity: f64,
    pub projected_maintenance_margin: f64,
    pub projected_initial_margin: f64,
    pub margin_balance: f64,
    #[serde(default)]
    pub total_pl: f64,
}

impl PortfolioSimulation {
    pub fn from_result(result: &Value) -> RiskResult<Self> {
        serde_json::from_value(result.clone()).map_err(|e| RiskError::InvalidSimulation(e.to_string()))
    }
}

/// Outcome of the pre-check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginVerdict {
    Pass,
    NoSimulation,
    MaintenanceShortfall { equity: f64, required: f64 },
    InitialShortfall { margin_balance: f64, required: f64 },
}

impl MarginVerdict {
    pub fn evaluate(simulation: Option<&PortfolioSimulation>, maintenance_multiplier: f64) -> Self {
        let Some(sim) = simulation else {
            return Self::NoSimulation;
        };
        let required = sim.projected_maintenance_margin * maintenance_multiplier;
        // NaN compares false, so a malformed figure never passes.
        if !(sim.equity >= required) {
            return Self::MaintenanceShortfall {
                equity: sim.equity,
                required,
            };
        }
        if !(sim.margin_balance >= sim.projected_initial_margin) {
            return Self::InitialShortfall {
                margin_balance: sim.margin_balance,
                required: sim.projected_initial_margin,
            };
        }
        Self::Pass
    }

    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl std::fmt::Display for MarginVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::NoSimulation => write!(f, "no simulation result"),
            Self::MaintenanceShortfall { equity, required } => {
                write!(f, "equity {equity} below required {required}")
            }
            Self::InitialShortfall {
                margin_balance,
                required,
            } => write!(f, "margin balance {margin_balance} below initial margin {required}"),
        }
    }
}

/// Latest simulation result, filled by the inbound dispatcher.
///
/// Every simulation request shares one JSON-RPC id and replies arrive in
/// request order, so the slot counts requests and replies. A result is
/// kept only when it answers the newest request.
#[derive(Debug, Default)]
pub struct SimulationSlot {
    inner: Mutex<SlotInner>,
    filled: Notify,
}

#[derive(Debug, Default)]
struct SlotInner {
    latest: Option<PortfolioSimulation>,
    requested: u64,
    answered: u64,
}

impl SlotInner {
    /// Count one reply; `true` if it answers the newest request.
    fn answer(&mut self) -> bool {
        self.answered = (self.answered + 1).min(self.requested);
        self.answered == self.requested
    }
}

impl SimulationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request and drop the previous result.
    pub fn begin(&self) {
        let mut inner = self.inner.lock();
        inner.requested += 1;
        inner.latest = None;
    }

    /// Forget the newest request when it was never sent.
    pub fn abandon(&self) {
        let mut inner = self.inner.lock();
        if inner.requested > inner.answered {
            inner.requested -= 1;
        }
    }

    pub fn fill(&self, simulation: PortfolioSimulation) {
        {
            let mut inner = self.inner.lock();
            if !inner.answer() {
                debug!(
                    outstanding = inner.requested - inner.answered,
                    "Dropping simulation result of a superseded request"
                );
                return;
            }
            inner.latest = Some(simulation);
        }
        self.filled.notify_waiters();
    }

    /// Count a reply that carried no usable result.
    pub fn reject(&self) {
        self.inner.lock().answer();
    }

    pub fn latest(&self) -> Option<PortfolioSimulation> {
        self.inner.lock().latest
    }

    /// Wait until the slot is filled or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> Option<PortfolioSimulation> {
        let notified = self.filled.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if let Some(sim) = self.latest() {
            return Some(sim);
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.latest()
    }
}
