//! Calendar risk-reversal client.
//!
//! Wires the exchange session, market data ingest, analytics, risk and
//! execution into one process:
//! - authenticated JSON-RPC session with heartbeat and token refresh
//! - dynamic OTM option subscriptions
//! - ATM skew analytics and the risk-reversal spread
//! - margin pre-check and one-shot four-leg execution
//! - operator commands on stdin

pub mod account;
pub mod app;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod positions;
pub mod scheduler;

pub use app::Application;
pub use command::{Command, CommandHandler, CommandRequest};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
