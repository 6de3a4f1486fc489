//! Analytics engine for the options risk-reversal bot.
//!
//! Every cycle, per selected expiration:
//! 1. Pull the last day of mark-curve rows and build the implied vol smile
//!    over log-moneyness (calls and puts merged, duplicate buckets averaged)
//! 2. Fit a not-a-knot cubic spline and take its slope at the money
//!    (persisted as the skewness signal)
//! 3. Evaluate the risk-neutral density implied by the fitted smile and
//!    summarize it by mean, standard deviation and skewness

pub mod config;
pub mod density;
pub mod engine;
pub mod error;
pub mod smile;
pub mod spline;

pub use config::AnalyticsConfig;
pub use density::{risk_neutral_density, DensityCurve, DensityInputs, DensitySummary};
pub use engine::{AnalyticsEngine, ExpirationReport};
pub use error::{AnalyticsError, AnalyticsResult};
pub use smile::{Smile, SmilePoint};
pub use spline::CubicSpline;
