//! Execution engine for the calendar risk-reversal.
//!
//! Fires the configured four-leg spread at most once per enable:
//! - [`ExecutionGate`]: one-shot enabled flag, consumed atomically
//! - [`SpreadExecutor`]: gate checks and sequential leg submission
//!
//! # Gate Checks (in `SpreadExecutor::run_cycle`)
//!
//! 1. enabled -> Blocked::Disabled
//! 2. latest spread published -> Blocked::NoSpread
//! 3. rr_iv > 0 and rr_price > 0 -> Blocked::SpreadNotPositive
//! 4. direction pre-check flag -> Blocked::PrecheckFailed
//! 5. legs selected -> Blocked::LegsNotSelected
//! 6. (all passed) -> consume the gate, send far call, far put, near call, near put

pub mod config;
pub mod error;
pub mod executor;
pub mod gate;

pub use config::ExecutionConfig;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{Blocked, ExecutionReport, SpreadExecutor};
pub use gate::ExecutionGate;
