//! Per-cycle analytics runner.

use crate::config::AnalyticsConfig;
use crate::density::{risk_neutral_density, DensityInputs, DensitySummary};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::smile::Smile;
use crate::spline::CubicSpline;
use chrono::Utc;
use skew_core::{CycleOutcome, Expiration, SkewnessRecord, SkipReason};
use skew_feed::MarketState;
use skew_persistence::TickStore;
use skew_telemetry::Metrics;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of analyzing one expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpirationReport {
    pub expiration: Expiration,
    /// Timestamp of the newest mark row (ms).
    pub timestamp_ms: i64,
    pub atm_slope: f64,
    /// False when a record with the same key already existed.
    pub inserted: bool,
    /// Distinct moneyness points in the smile.
    pub points: usize,
    /// `None` when the fitted smile was unusable for the density.
    pub density: Option<DensitySummary>,
}

/// Rebuilds the smile of each selected expiration from stored mark rows.
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    expirations: Vec<Expiration>,
    store: Arc<dyn TickStore>,
    state: Arc<MarketState>,
}

impl AnalyticsEngine {
    pub fn new(
        config: AnalyticsConfig,
        expirations: Vec<Expiration>,
        store: Arc<dyn TickStore>,
        state: Arc<MarketState>,
    ) -> Self {
        Self {
            config,
            expirations,
            store,
            state,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Analyze every selected expiration.
    ///
    /// Completed if at least one expiration produced a slope.
    pub fn run_cycle(&self) -> CycleOutcome {
        let now_ms = Utc::now().timestamp_millis();
        self.run_at(now_ms)
    }

    fn run_at(&self, now_ms: i64) -> CycleOutcome {
        let mut last_skip: Option<SkipReason> = None;
        let mut completed = 0usize;

        for expiration in &self.expirations {
            match self.analyze(expiration, now_ms) {
                Ok(report) => {
                    completed += 1;
                    info!(
                        expiration = %report.expiration,
                        atm_slope = report.atm_slope,
                        points = report.points,
                        inserted = report.inserted,
                        "Smile fitted"
                    );
                }
                Err(e) => {
                    match &e {
                        AnalyticsError::InsufficientData(_) | AnalyticsError::Expired(_) => {
                            debug!(expiration = %expiration, error = %e, "Expiration skipped")
                        }
                        _ => warn!(expiration = %expiration, error = %e, "Expiration analysis failed"),
                    }
                    last_skip = Some(e.into());
                }
            }
        }

        match (completed, last_skip) {
            (0, Some(reason)) => CycleOutcome::skipped(reason),
            (0, None) => CycleOutcome::skipped(SkipReason::NotReady(
                "no expirations selected".to_string(),
            )),
            _ => CycleOutcome::Completed,
        }
    }

    /// Fit the smile of one expiration and persist its at-the-money slope.
    pub fn analyze(&self, expiration: &Expiration, now_ms: i64) -> AnalyticsResult<ExpirationReport> {
        let lookback_ms = i64::try_from(self.config.lookback_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        let rows = self
            .store
            .latest_marks_per_strike(expiration.expiry_ts(), now_ms.saturating_sub(lookback_ms));

        let smile = Smile::from_marks(&rows, self.config.min_strikes_per_side)?;
        self.state
            .add_strikes(expiration.label(), smile.strikes.iter().copied());

        let tau = expiration.years_to_expiry(smile.timestamp_ms, self.config.days_per_year);
        if tau <= 0.0 {
            return Err(AnalyticsError::Expired(format!(
                "{} settled before {}",
                expiration, smile.timestamp_ms
            )));
        }

        let spline = CubicSpline::not_a_knot(&smile.log_moneyness(), &smile.ivs())?;
        let atm_slope = spline.derivative(0.0);
        if !atm_slope.is_finite() {
            return Err(AnalyticsError::InvalidInput(format!("atm slope {atm_slope}")));
        }

        let record = SkewnessRecord {
            timestamp_ms: smile.timestamp_ms,
            expiration_ts: expiration.expiry_ts(),
            atm_slope,
        };
        let inserted = self.store.insert_skewness(&record)?;
        Metrics::atm_slope(expiration.label(), atm_slope);

        let density = self.density(expiration, &smile, &spline, tau);

        Ok(ExpirationReport {
            expiration: expiration.clone(),
            timestamp_ms: smile.timestamp_ms,
            atm_slope,
            inserted,
            points: smile.points.len(),
            density,
        })
    }

    fn density(
        &self,
        expiration: &Expiration,
        smile: &Smile,
        spline: &CubicSpline,
        tau: f64,
    ) -> Option<DensitySummary> {
        let (lo, hi) = smile.range();
        let inputs = DensityInputs {
            underlying: smile.underlying,
            tau,
            risk_free_rate: self.config.risk_free_rate,
            grid_points: self.config.density_grid_points,
        };
        let summary = risk_neutral_density(spline, lo, hi, inputs).and_then(|curve| {
            debug!(
                expiration = %expiration,
                raw_integral = curve.raw_integral,
                "Density evaluated"
            );
            curve.summary()
        });

        match summary {
            Ok(summary) => {
                Metrics::density_skewness(expiration.label(), summary.skewness);
                info!(
                    expiration = %expiration,
                    mean = summary.mean,
                    std = summary.std,
                    skewness = summary.skewness,
                    "Risk-neutral density"
                );
                Some(summary)
            }
            Err(e) => {
                warn!(expiration = %expiration, error = %e, "Density skipped");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skew_core::{log_moneyness, MarkQuote, OptionKind, Strike};
    use skew_persistence::JsonLinesStore;

    const NOW_MS: i64 = 1_740_000_000_000;

    fn expiration() -> Expiration {
        Expiration::parse("28MAR25").unwrap()
    }

    fn mark(ts: i64, kind: OptionKind, strike: Strike, iv: f64) -> MarkQuote {
        let underlying = 100_000.0;
        MarkQuote {
            timestamp_ms: ts,
            instrument: format!("BTC-28MAR25-{strike}-{}", kind.suffix()),
            expiration_ts: expiration().expiry_ts(),
            kind,
            strike,
            mark_price: 0.01,
            mark_iv: iv,
            underlying_price: underlying,
            log_moneyness: log_moneyness(strike, underlying),
        }
    }

    fn seeded_store(per_side: usize) -> Arc<JsonLinesStore> {
        let store = Arc::new(JsonLinesStore::in_memory());
        let calls = [105_000, 110_000, 120_000, 130_000, 140_000];
        let puts = [95_000, 90_000, 80_000, 70_000, 60_000];
        for strike in calls.into_iter().take(per_side) {
            let m = log_moneyness(strike, 100_000.0);
            store
                .insert_mark(&mark(NOW_MS - 1_000, OptionKind::Call, strike, 0.5 + 0.2 * m * m - 0.1 * m))
                .unwrap();
        }
        for strike in puts.into_iter().take(per_side) {
            let m = log_moneyness(strike, 100_000.0);
            store
                .insert_mark(&mark(NOW_MS - 1_000, OptionKind::Put, strike, 0.5 + 0.2 * m * m - 0.1 * m))
                .unwrap();
        }
        store
    }

    fn engine(store: Arc<JsonLinesStore>, state: Arc<MarketState>) -> AnalyticsEngine {
        AnalyticsEngine::new(AnalyticsConfig::default(), vec![expiration()], store, state)
    }

    #[test]
    fn test_analyze_persists_slope_once() {
        let store = seeded_store(4);
        let state = Arc::new(MarketState::new());
        let engine = engine(store.clone(), state.clone());

        let report = engine.analyze(&expiration(), NOW_MS).unwrap();
        assert!(report.inserted);
        assert_eq!(report.timestamp_ms, NOW_MS - 1_000);
        assert_eq!(report.points, 8);
        // Smile is 0.5 - 0.1 m + 0.2 m^2, so the slope at the money is near -0.1.
        assert!((report.atm_slope + 0.1).abs() < 0.02, "slope {}", report.atm_slope);
        assert!(report.density.is_some());

        let again = engine.analyze(&expiration(), NOW_MS).unwrap();
        assert!(!again.inserted);
        assert_eq!(store.skewness_for(expiration().expiry_ts()).len(), 1);

        assert_eq!(state.strikes("28MAR25").len(), 8);
    }

    #[test]
    fn test_insufficient_strikes_skip() {
        let engine = engine(seeded_store(3), Arc::new(MarketState::new()));
        assert!(matches!(
            engine.analyze(&expiration(), NOW_MS),
            Err(AnalyticsError::InsufficientData(_))
        ));
        assert!(matches!(
            engine.run_at(NOW_MS),
            CycleOutcome::Skipped(SkipReason::InsufficientData(_))
        ));
    }

    #[test]
    fn test_rows_outside_lookback_are_ignored() {
        let engine = engine(seeded_store(4), Arc::new(MarketState::new()));
        let two_days_later = NOW_MS + 2 * 86_400_000;
        assert!(matches!(
            engine.analyze(&expiration(), two_days_later),
            Err(AnalyticsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_expired_expiration() {
        let store = Arc::new(JsonLinesStore::in_memory());
        let after_ms = (expiration().expiry_ts() + 3_600) * 1000;
        for strike in [105_000, 110_000, 120_000, 130_000] {
            store.insert_mark(&mark(after_ms, OptionKind::Call, strike, 0.5)).unwrap();
        }
        for strike in [95_000, 90_000, 80_000, 70_000] {
            store.insert_mark(&mark(after_ms, OptionKind::Put, strike, 0.55)).unwrap();
        }
        let engine = engine(store, Arc::new(MarketState::new()));
        assert!(matches!(
            engine.analyze(&expiration(), after_ms),
            Err(AnalyticsError::Expired(_))
        ));
    }

    #[test]
    fn test_cycle_completes() {
        let engine = engine(seeded_store(5), Arc::new(MarketState::new()));
        assert_eq!(engine.run_at(NOW_MS), CycleOutcome::Completed);
    }
}
