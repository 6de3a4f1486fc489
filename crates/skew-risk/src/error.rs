//! Risk error types.

use skew_core::SkipReason;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Invalid simulation result: {0}")]
    InvalidSimulation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] skew_persistence::PersistenceError),
}

pub type RiskResult<T> = Result<T, RiskError>;

impl From<RiskError> for SkipReason {
    fn from(e: RiskError) -> Self {
        match e {
            RiskError::InsufficientData(s) => SkipReason::InsufficientData(s),
            RiskError::NotReady(s) => SkipReason::NotReady(s),
            other => SkipReason::Failed(other.to_string()),
        }
    }
}
