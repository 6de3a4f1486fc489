//! Risk-neutral density implied by a fitted smile.
//!
//! For each grid point `m` with fitted vol `σ = smile(m)`:
//!
//! ```text
//! d2      = (-m + (r - σ²/2) τ) / (σ √τ)
//! density ∝ exp(-d2² / 2) / (σ e^m S √(2πτ))
//! ```
//!
//! The curve is normalized to unit mass with the trapezoid rule and then
//! summarized by its own mean, standard deviation and standardized third
//! moment.

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::spline::CubicSpline;
use std::f64::consts::PI;

/// Market inputs of the density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityInputs {
    pub underlying: f64,
    /// Time to expiry in years.
    pub tau: f64,
    pub risk_free_rate: f64,
    pub grid_points: usize,
}

/// Normalized density over log-moneyness.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityCurve {
    pub log_moneyness: Vec<f64>,
    pub density: Vec<f64>,
    /// Mass before normalization.
    pub raw_integral: f64,
}

/// Moments of a normalized density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensitySummary {
    pub mean: f64,
    pub std: f64,
    pub skewness: f64,
}

/// Evaluate the density on an evenly spaced grid over `[lo, hi]`.
pub fn risk_neutral_density(
    smile: &CubicSpline,
    lo: f64,
    hi: f64,
    inputs: DensityInputs,
) -> AnalyticsResult<DensityCurve> {
    let DensityInputs {
        underlying,
        tau,
        risk_free_rate: r,
        grid_points,
    } = inputs;

    if grid_points < 2 || !(lo < hi) {
        return Err(AnalyticsError::InvalidInput(format!(
            "grid [{lo}, {hi}] with {grid_points} points"
        )));
    }
    if !(tau > 0.0) || !(underlying > 0.0) {
        return Err(AnalyticsError::InvalidInput(format!(
            "tau {tau}, underlying {underlying}"
        )));
    }

    let step = (hi - lo) / (grid_points - 1) as f64;
    let sqrt_tau = tau.sqrt();
    let norm = underlying * (2.0 * PI * tau).sqrt();

    let mut grid = Vec::with_capacity(grid_points);
    let mut density = Vec::with_capacity(grid_points);
    for i in 0..grid_points {
        let m = if i == grid_points - 1 { hi } else { lo + step * i as f64 };
        let sigma = smile.evaluate(m);
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(AnalyticsError::InvalidInput(format!(
                "fitted vol {sigma} at log-moneyness {m:.4}"
            )));
        }
        let d2 = (-m + (r - sigma * sigma / 2.0) * tau) / (sigma * sqrt_tau);
        density.push((-d2 * d2 / 2.0).exp() / (sigma * m.exp() * norm));
        grid.push(m);
    }

    let raw_integral = trapezoid(&density, &grid);
    if !raw_integral.is_finite() || raw_integral <= 0.0 {
        return Err(AnalyticsError::InvalidInput(format!(
            "density integral {raw_integral}"
        )));
    }
    for value in &mut density {
        *value /= raw_integral;
    }

    Ok(DensityCurve {
        log_moneyness: grid,
        density,
        raw_integral,
    })
}

impl DensityCurve {
    pub fn summary(&self) -> AnalyticsResult<DensitySummary> {
        let x = &self.log_moneyness;
        let weighted = |f: &dyn Fn(f64) -> f64| {
            let ys: Vec<f64> = x
                .iter()
                .zip(&self.density)
                .map(|(&m, &p)| p * f(m))
                .collect();
            trapezoid(&ys, x)
        };

        let mean = weighted(&|m| m);
        let variance = weighted(&|m| (m - mean).powi(2));
        let std = variance.sqrt();
        if !std.is_finite() || std <= 0.0 {
            return Err(AnalyticsError::InvalidInput(format!("density std {std}")));
        }
        let skewness = weighted(&|m| (m - mean).powi(3)) / std.powi(3);

        Ok(DensitySummary { mean, std, skewness })
    }

    /// Mass of the normalized curve (1 up to rounding).
    pub fn mass(&self) -> f64 {
        trapezoid(&self.density, &self.log_moneyness)
    }
}

fn trapezoid(ys: &[f64], xs: &[f64]) -> f64 {
    xs.windows(2)
        .zip(ys.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}
