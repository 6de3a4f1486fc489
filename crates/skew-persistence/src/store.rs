//! Storage interface consumed by ingest, analytics and risk.

use crate::error::PersistenceResult;
use skew_core::{MarkQuote, OptionQuote, SkewnessRecord};

/// Insert/query interface over the tick and analytics tables.
///
/// Queries return rows newest first.
#[cfg_attr(test, mockall::automock)]
pub trait TickStore: Send + Sync {
    /// Append a per-strike ticker quote.
    fn insert_quote(&self, quote: &OptionQuote) -> PersistenceResult<()>;

    /// Append a mark-price curve point.
    fn insert_mark(&self, mark: &MarkQuote) -> PersistenceResult<()>;

    /// Insert-or-ignore on `(timestamp_ms, expiration_ts)`.
    ///
    /// Returns `false` when a record with the same key already exists.
    fn insert_skewness(&self, record: &SkewnessRecord) -> PersistenceResult<bool>;

    /// Quotes of one expiration with `timestamp_ms >= since_ms`.
    fn quotes_since(&self, expiration_ts: i64, since_ms: i64) -> Vec<OptionQuote>;

    /// Mark points of one expiration with `timestamp_ms >= since_ms`.
    fn marks_since(&self, expiration_ts: i64, since_ms: i64) -> Vec<MarkQuote>;

    /// Newest mark point per `(kind, strike)` inside the window.
    fn latest_marks_per_strike(&self, expiration_ts: i64, since_ms: i64) -> Vec<MarkQuote>;

    fn skewness_for(&self, expiration_ts: i64) -> Vec<SkewnessRecord>;
}
