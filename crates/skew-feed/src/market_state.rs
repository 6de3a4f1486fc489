//! Shared market state.
//!
//! Per-expiration latest underlying price, observed strike universe and the
//! currently selected OTM legs. Every map is keyed by expiration label.
//! Price updates are "latest wins"; strike universes only grow.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use skew_core::{LegPair, Strike};
use std::collections::BTreeSet;
use tracing::debug;

/// Latest underlying price for an expiration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnderlyingPrice {
    pub price: f64,
    /// Exchange timestamp (ms).
    pub timestamp_ms: i64,
    pub received_at: DateTime<Utc>,
}

/// Market state shared between ingest, subscription, analytics and risk.
#[derive(Debug, Default)]
pub struct MarketState {
    underlying: DashMap<String, UnderlyingPrice>,
    strikes: DashMap<String, BTreeSet<Strike>>,
    legs: DashMap<String, LegPair>,
}

impl MarketState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the underlying price of an expiration.
    pub fn set_underlying(&self, expiration: &str, price: f64, timestamp_ms: i64) {
        self.underlying.insert(
            expiration.to_string(),
            UnderlyingPrice {
                price,
                timestamp_ms,
                received_at: Utc::now(),
            },
        );
    }

    pub fn underlying(&self, expiration: &str) -> Option<f64> {
        self.underlying.get(expiration).map(|entry| entry.price)
    }

    pub fn underlying_entry(&self, expiration: &str) -> Option<UnderlyingPrice> {
        self.underlying.get(expiration).map(|entry| *entry)
    }

    /// Merge strikes into the universe. Returns how many were new.
    pub fn add_strikes(&self, expiration: &str, strikes: impl IntoIterator<Item = Strike>) -> usize {
        let mut universe = self.strikes.entry(expiration.to_string()).or_default();
        let before = universe.len();
        universe.extend(strikes);
        let added = universe.len() - before;
        if added > 0 {
            debug!(expiration, added, total = universe.len(), "Strike universe grew");
        }
        added
    }

    /// Sorted strike universe (empty if none observed yet).
    pub fn strikes(&self, expiration: &str) -> Vec<Strike> {
        self.strikes
            .get(expiration)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_strikes(&self, expiration: &str) -> bool {
        self.strikes
            .get(expiration)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    pub fn set_legs(&self, expiration: &str, legs: LegPair) {
        self.legs.insert(expiration.to_string(), legs);
    }

    pub fn legs(&self, expiration: &str) -> Option<LegPair> {
        self.legs.get(expiration).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underlying_latest_wins() {
        let state = MarketState::new();
        assert_eq!(state.underlying("28MAR25"), None);

        state.set_underlying("28MAR25", 100_000.0, 1);
        state.set_underlying("28MAR25", 99_500.0, 2);
        assert_eq!(state.underlying("28MAR25"), Some(99_500.0));
        assert_eq!(state.underlying_entry("28MAR25").unwrap().timestamp_ms, 2);
        assert_eq!(state.underlying("27JUN25"), None);
    }

    #[test]
    fn test_strike_universe_grows_monotonically() {
        let state = MarketState::new();
        assert!(!state.has_strikes("28MAR25"));

        assert_eq!(state.add_strikes("28MAR25", [110_000, 90_000]), 2);
        assert_eq!(state.add_strikes("28MAR25", [90_000, 100_000]), 1);
        assert_eq!(state.strikes("28MAR25"), vec![90_000, 100_000, 110_000]);
        assert!(state.has_strikes("28MAR25"));
        assert!(state.strikes("27JUN25").is_empty());
    }

    #[test]
    fn test_legs() {
        let state = MarketState::new();
        assert!(state.legs("28MAR25").is_none());
        state.set_legs("28MAR25", LegPair { call: 110_000, put: 90_000 });
        assert_eq!(state.legs("28MAR25").unwrap().put, 90_000);
    }
}
