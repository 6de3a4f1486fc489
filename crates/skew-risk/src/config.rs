//! Risk manager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the risk cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Cycle period in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Quote history used for the spread.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Resample grid step.
    #[serde(default = "default_resample_secs")]
    pub resample_secs: u64,
    /// Required `equity / projected_maintenance_margin`.
    #[serde(default = "default_maintenance_margin_multiplier")]
    pub maintenance_margin_multiplier: f64,
    /// Width of the informational bounds in standard deviations.
    #[serde(default = "default_bound_std_multiplier")]
    pub bound_std_multiplier: f64,
    /// How long to wait for the simulation response.
    #[serde(default = "default_simulation_wait_secs")]
    pub simulation_wait_secs: u64,
}

fn default_period_secs() -> u64 {
    60
}

fn default_lookback_secs() -> u64 {
    43_200
}

fn default_resample_secs() -> u64 {
    20
}

fn default_maintenance_margin_multiplier() -> f64 {
    1.2
}

fn default_bound_std_multiplier() -> f64 {
    2.0
}

fn default_simulation_wait_secs() -> u64 {
    5
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            lookback_secs: default_lookback_secs(),
            resample_secs: default_resample_secs(),
            maintenance_margin_multiplier: default_maintenance_margin_multiplier(),
            bound_std_multiplier: default_bound_std_multiplier(),
            simulation_wait_secs: default_simulation_wait_secs(),
        }
    }
}

impl RiskConfig {
    pub fn simulation_wait(&self) -> Duration {
        Duration::from_secs(self.simulation_wait_secs)
    }

    pub fn resample_ms(&self) -> i64 {
        i64::try_from(self.resample_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn lookback_ms(&self) -> i64 {
        i64::try_from(self.lookback_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.period_secs == 0 {
            return Err("risk.period_secs must be positive".to_string());
        }
        if self.lookback_secs == 0 {
            return Err("risk.lookback_secs must be positive".to_string());
        }
        if self.resample_secs == 0 {
            return Err("risk.resample_secs must be positive".to_string());
        }
        if !self.maintenance_margin_multiplier.is_finite() || self.maintenance_margin_multiplier < 1.0 {
            return Err(format!(
                "risk.maintenance_margin_multiplier ({}) must be at least 1",
                self.maintenance_margin_multiplier
            ));
        }
        if !self.bound_std_multiplier.is_finite() || self.bound_std_multiplier < 0.0 {
            return Err("risk.bound_std_multiplier must be non-negative".to_string());
        }
        Ok(())
    }
}
