//! Prometheus metrics and structured logging for the skew bot.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus metrics for the session, ingest, analytics, risk and
//!   execution cycles, rendered on demand in the text exposition format

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
