//! Tick and analytics storage.
//!
//! Ingest appends normalized option quotes and mark-curve points; the
//! analytics and risk cycles query them back by expiration and lookback
//! window. Skewness results are stored with insert-or-ignore semantics.
//!
//! Rows live in an in-memory index and are mirrored to daily JSON Lines
//! files so a restart can reload the retention window.

pub mod error;
pub mod jsonl;
pub mod store;

pub use error::{PersistenceError, PersistenceResult};
pub use jsonl::{JsonLinesStore, StoreConfig};
pub use store::TickStore;
