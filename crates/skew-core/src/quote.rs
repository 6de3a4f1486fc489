//! Normalized market-data rows.
//!
//! These are the rows Ingest forwards to storage and the analytics/risk
//! components read back.

use crate::instrument::{OptionKind, Strike};
use serde::{Deserialize, Serialize};

/// Per-strike ticker quote.
///
/// Only stored when it passed the out-of-the-money filter against
/// `underlying_price` at quote time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Exchange event time (ms).
    pub timestamp_ms: i64,
    pub instrument: String,
    /// Expiry timestamp (seconds).
    pub expiration_ts: i64,
    pub kind: OptionKind,
    pub strike: Strike,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
    pub underlying_price: f64,
    /// `ln(strike / underlying_price)`.
    pub log_moneyness: f64,
    pub delta: Option<f64>,
    pub vega: Option<f64>,
    pub theta: Option<f64>,
}

/// One point of the mark-price curve snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkQuote {
    pub timestamp_ms: i64,
    pub instrument: String,
    pub expiration_ts: i64,
    pub kind: OptionKind,
    pub strike: Strike,
    pub mark_price: f64,
    pub mark_iv: f64,
    pub underlying_price: f64,
    pub log_moneyness: f64,
}

/// At-the-money slope of the fitted smile.
///
/// At most one record per (timestamp, expiration).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkewnessRecord {
    pub timestamp_ms: i64,
    pub expiration_ts: i64,
    pub atm_slope: f64,
}

impl SkewnessRecord {
    /// Deduplication key.
    pub fn key(&self) -> (i64, i64) {
        (self.timestamp_ms, self.expiration_ts)
    }
}
