//! Analytics error types.

use skew_core::SkipReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Singular system: {0}")]
    Singular(String),

    #[error("Storage error: {0}")]
    Storage(#[from] skew_persistence::PersistenceError),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

impl From<AnalyticsError> for SkipReason {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::InsufficientData(s) => SkipReason::InsufficientData(s),
            AnalyticsError::Expired(s) => SkipReason::Expired(s),
            other => SkipReason::Failed(other.to_string()),
        }
    }
}
