//! Analytics configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the analytics cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Cycle period in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Mark-curve rows older than this are ignored.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Unique strikes required on each side of the smile.
    #[serde(default = "default_min_strikes_per_side")]
    pub min_strikes_per_side: usize,
    /// Continuously compounded risk-free rate used by the density.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_days_per_year")]
    pub days_per_year: f64,
    #[serde(default = "default_density_grid_points")]
    pub density_grid_points: usize,
}

fn default_period_secs() -> u64 {
    60
}

fn default_lookback_secs() -> u64 {
    86_400
}

fn default_min_strikes_per_side() -> usize {
    4
}

fn default_risk_free_rate() -> f64 {
    0.043
}

fn default_days_per_year() -> f64 {
    365.0
}

fn default_density_grid_points() -> usize {
    1_000
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            lookback_secs: default_lookback_secs(),
            min_strikes_per_side: default_min_strikes_per_side(),
            risk_free_rate: default_risk_free_rate(),
            days_per_year: default_days_per_year(),
            density_grid_points: default_density_grid_points(),
        }
    }
}

impl AnalyticsConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.period_secs == 0 {
            return Err("analytics.period_secs must be positive".to_string());
        }
        if self.lookback_secs == 0 {
            return Err("analytics.lookback_secs must be positive".to_string());
        }
        if self.min_strikes_per_side < 2 {
            return Err(format!(
                "analytics.min_strikes_per_side ({}) must be at least 2",
                self.min_strikes_per_side
            ));
        }
        if !self.days_per_year.is_finite() || self.days_per_year <= 0.0 {
            return Err("analytics.days_per_year must be positive".to_string());
        }
        if self.density_grid_points < 2 {
            return Err("analytics.density_grid_points must be at least 2".to_string());
        }
        Ok(())
    }
}
