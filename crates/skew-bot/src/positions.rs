//! Periodic position query. The answer arrives through the dispatcher.

use skew_core::{CycleOutcome, SkipReason};
use skew_ws::{SendError, WsWriteHandle};
use tracing::debug;

/// Instrument kind requested from `private/get_positions`.
pub const POSITION_KIND: &str = "option";

pub struct PositionPoller {
    currency: String,
    handle: WsWriteHandle,
}

impl PositionPoller {
    pub fn new(currency: impl Into<String>, handle: WsWriteHandle) -> Self {
        Self {
            currency: currency.into(),
            handle,
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        match self.handle.get_positions(&self.currency, POSITION_KIND).await {
            Ok(()) => {
                debug!(currency = %self.currency, "Position query sent");
                CycleOutcome::Completed
            }
            Err(SendError::ChannelClosed) => CycleOutcome::Fatal("session writer closed".to_string()),
            Err(SendError::NotReady) => {
                CycleOutcome::skipped(SkipReason::NotReady("session not ready".to_string()))
            }
            Err(SendError::Encode(e)) => CycleOutcome::skipped(SkipReason::Failed(e)),
        }
    }
}
