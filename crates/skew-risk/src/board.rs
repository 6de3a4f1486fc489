//! Shared risk signals read by the execution engine and the command source.

use crate::bounds::SpreadBounds;
use crate::margin::SimulationSlot;
use crate::spread::{LegMids, SpreadRow};
use parking_lot::RwLock;
use skew_core::SpreadDirection;
use std::sync::atomic::{AtomicBool, Ordering};

/// Latest spread, bounds and pre-check flags.
///
/// Thread-safe: shared via `Arc<RiskBoard>`. Both pre-check flags start
/// false and only a passing margin check sets one.
#[derive(Debug, Default)]
pub struct RiskBoard {
    latest: RwLock<Option<SpreadRow>>,
    mids: RwLock<Option<LegMids>>,
    bounds: RwLock<Option<SpreadBounds>>,
    precheck_short: AtomicBool,
    precheck_long: AtomicBool,
    simulation: SimulationSlot,
}

/// Point-in-time copy for status reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSnapshot {
    pub latest: Option<SpreadRow>,
    /// Leg mids of the joined row behind `latest`.
    pub mids: Option<LegMids>,
    pub bounds: Option<SpreadBounds>,
    pub precheck_short: bool,
    pub precheck_long: bool,
}

impl RiskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, row: SpreadRow, bounds: Option<SpreadBounds>) {
        *self.latest.write() = Some(row);
        *self.bounds.write() = bounds;
    }

    pub fn publish_mids(&self, mids: LegMids) {
        *self.mids.write() = Some(mids);
    }

    pub fn latest(&self) -> Option<SpreadRow> {
        *self.latest.read()
    }

    pub fn bounds(&self) -> Option<SpreadBounds> {
        *self.bounds.read()
    }

    fn flag(&self, direction: SpreadDirection) -> &AtomicBool {
        match direction {
            SpreadDirection::Short => &self.precheck_short,
            SpreadDirection::Long => &self.precheck_long,
        }
    }

    pub fn set_precheck(&self, direction: SpreadDirection, passed: bool) {
        self.flag(direction).store(passed, Ordering::SeqCst);
    }

    #[must_use]
    pub fn precheck(&self, direction: SpreadDirection) -> bool {
        self.flag(direction).load(Ordering::SeqCst)
    }

    pub fn simulation(&self) -> &SimulationSlot {
        &self.simulation
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            latest: self.latest(),
            mids: *self.mids.read(),
            bounds: self.bounds(),
            precheck_short: self.precheck(SpreadDirection::Short),
            precheck_long: self.precheck(SpreadDirection::Long),
        }
    }
}
