//! Outcome of one run of a periodic task.
//!
//! Periodic tasks (subscription recompute, analytics, risk, execution,
//! position polling) never panic or bubble errors out of their loop. Each
//! run reports one of these outcomes and the driver decides what to do.

use std::fmt;
use std::time::Duration;

/// Why a cycle (or a part of one) did nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Not enough rows for the computation.
    InsufficientData(String),
    /// A prerequisite (price, strike universe, leg selection) is not known yet.
    NotReady(String),
    /// Expiration already settled.
    Expired(String),
    /// Gate conditions did not hold.
    GateClosed(String),
    /// Recoverable processing failure (logged, retried next period).
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData(s) => write!(f, "insufficient data: {s}"),
            Self::NotReady(s) => write!(f, "not ready: {s}"),
            Self::Expired(s) => write!(f, "expired: {s}"),
            Self::GateClosed(s) => write!(f, "gate closed: {s}"),
            Self::Failed(s) => write!(f, "failed: {s}"),
        }
    }
}

/// Result of a single periodic cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Work done; run again after the regular period.
    Completed,
    /// Nothing done this time; run again after the regular period.
    Skipped(SkipReason),
    /// Nothing done; run again after `retry_after` instead of the period.
    Deferred {
        reason: SkipReason,
        retry_after: Duration,
    },
    /// Unrecoverable; the driver stops and signals shutdown.
    Fatal(String),
}

impl CycleOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped(reason)
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped(_) => "skipped",
            Self::Deferred { .. } => "deferred",
            Self::Fatal(_) => "fatal",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Delay before the next run, given the task's regular period.
    pub fn next_delay(&self, period: Duration) -> Option<Duration> {
        match self {
            Self::Completed | Self::Skipped(_) => Some(period),
            Self::Deferred { retry_after, .. } => Some(*retry_after),
            Self::Fatal(_) => None,
        }
    }
}
