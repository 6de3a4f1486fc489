//! Executor error types.

use skew_ws::SendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Leg `leg` (1-based) could not be sent; earlier legs were not rolled back.
    #[error("Leg {leg} of 4 failed after {sent} sent: {source}")]
    LegFailed {
        leg: usize,
        sent: usize,
        #[source]
        source: SendError,
    },
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
