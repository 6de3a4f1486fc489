//! Risk manager for the calendar risk-reversal.
//!
//! Every cycle:
//! - Resamples the near/far call/put quote series onto a fixed grid
//!   (forward-filled) and joins them on the common timestamps
//! - Computes the risk-reversal spread in iv and in price for the
//!   configured direction and publishes the latest row
//! - Tracks mean ± k·std bounds of the iv spread (informational)
//! - Simulates the four candidate legs against the exchange and sets the
//!   direction's margin pre-check flag (fail-closed)

pub mod board;
pub mod bounds;
pub mod config;
pub mod error;
pub mod legs;
pub mod manager;
pub mod margin;
pub mod resample;
pub mod spread;

pub use board::{RiskBoard, RiskSnapshot};
pub use bounds::SpreadBounds;
pub use config::RiskConfig;
pub use error::{RiskError, RiskResult};
pub use legs::{SpreadLegs, SpreadTarget};
pub use manager::RiskManager;
pub use margin::{MarginVerdict, PortfolioSimulation, SimulationSlot};
pub use resample::{resample, QuoteSample, ResampledSeries};
pub use spread::{join_legs, rr_spread, spread_history, JoinedLegs, LegMid, LegMids, SpreadRow};
