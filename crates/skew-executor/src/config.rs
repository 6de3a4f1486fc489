//! Execution configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Evaluation period in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

fn default_period_secs() -> u64 {
    60
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.period_secs == 0 {
            return Err("execution.period_secs must be positive".to_string());
        }
        Ok(())
    }
}
