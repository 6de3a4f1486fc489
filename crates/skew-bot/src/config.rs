//! Application configuration.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skew_analytics::AnalyticsConfig;
use skew_core::{Channels, Expiration, SpreadDirection};
use skew_executor::ExecutionConfig;
use skew_persistence::StoreConfig;
use skew_risk::{RiskConfig, SpreadTarget};
use skew_ws::{KeySource, RefreshPolicy, SessionConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Env var overriding the configured client id.
pub const CLIENT_ID_ENV: &str = "SKEW_CLIENT_ID";

pub const MAINNET_WS_URL: &str = "wss://www.deribit.com/ws/api/v2";
pub const TESTNET_WS_URL: &str = "wss://test.deribit.com/ws/api/v2";

// =============================================================================
// [session]
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    /// Explicit endpoint. Falls back to the main or test network URL.
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_refresh_check_secs")]
    pub refresh_check_secs: u64,
    /// Refresh this long before the access token expires.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    #[serde(default = "default_testnet_refresh_after_secs")]
    pub testnet_refresh_after_secs: u64,
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    #[serde(default = "default_heartbeat_timeout_multiplier")]
    pub heartbeat_timeout_multiplier: u32,
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_refresh_check_secs() -> u64 {
    5
}

fn default_refresh_margin_secs() -> u64 {
    240
}

fn default_testnet_refresh_after_secs() -> u64 {
    300
}

fn default_auth_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_timeout_multiplier() -> u32 {
    3
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ws_url: None,
            testnet: false,
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            refresh_check_secs: default_refresh_check_secs(),
            refresh_margin_secs: default_refresh_margin_secs(),
            testnet_refresh_after_secs: default_testnet_refresh_after_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
            heartbeat_timeout_multiplier: default_heartbeat_timeout_multiplier(),
        }
    }
}

impl SessionSection {
    pub fn url(&self) -> &str {
        match &self.ws_url {
            Some(url) => url,
            None if self.testnet => TESTNET_WS_URL,
            None => MAINNET_WS_URL,
        }
    }
}

// =============================================================================
// [credentials]
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialsSection {
    #[serde(default)]
    pub client_id: Option<String>,
    /// File holding the client id (first line).
    #[serde(default)]
    pub client_id_file: Option<PathBuf>,
    /// PEM private key (PKCS#8 or PKCS#1).
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,
    /// Read the PEM from this env var instead of `private_key_path`.
    #[serde(default)]
    pub private_key_env: Option<String>,
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("keys/private.pem")
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_id_file: None,
            private_key_path: default_private_key_path(),
            private_key_env: None,
        }
    }
}

impl CredentialsSection {
    /// Client id: `SKEW_CLIENT_ID` > `client_id` > `client_id_file`.
    pub fn client_id(&self) -> AppResult<String> {
        self.resolve_client_id(std::env::var(CLIENT_ID_ENV).ok())
    }

    fn resolve_client_id(&self, env_override: Option<String>) -> AppResult<String> {
        if let Some(id) = env_override.filter(|id| !id.trim().is_empty()) {
            return Ok(id.trim().to_string());
        }
        if let Some(id) = self.client_id.as_ref().filter(|id| !id.trim().is_empty()) {
            return Ok(id.trim().to_string());
        }
        if let Some(path) = &self.client_id_file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("Failed to read client id file {}: {e}", path.display()))
            })?;
            let id = content.lines().next().unwrap_or_default().trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
        Err(AppError::Config(format!(
            "No client id: set credentials.client_id, credentials.client_id_file or {CLIENT_ID_ENV}"
        )))
    }

    pub fn key_source(&self) -> KeySource {
        match &self.private_key_env {
            Some(var_name) => KeySource::EnvVar {
                var_name: var_name.clone(),
            },
            None => KeySource::File {
                path: self.private_key_path.clone(),
            },
        }
    }
}

// =============================================================================
// [strategy]
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySection {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Expiry labels. The nearest two form the spread.
    #[serde(default)]
    pub expirations: Vec<String>,
    /// Expirations priced off the perpetual instead of their own future.
    #[serde(default)]
    pub perpetual_proxies: Vec<String>,
    #[serde(default)]
    pub direction: SpreadDirection,
    /// Initial state of the one-shot execution gate.
    #[serde(default)]
    pub execution_enabled: bool,
    #[serde(default = "default_otm_log_moneyness")]
    pub otm_log_moneyness: f64,
    /// Amount per leg, in contracts.
    #[serde(default = "default_leg_amount")]
    pub leg_amount: Decimal,
}

fn default_currency() -> String {
    "BTC".to_string()
}

fn default_otm_log_moneyness() -> f64 {
    0.1
}

fn default_leg_amount() -> Decimal {
    Decimal::new(1, 1)
}

impl Default for StrategySection {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            expirations: Vec::new(),
            perpetual_proxies: Vec::new(),
            direction: SpreadDirection::default(),
            execution_enabled: false,
            otm_log_moneyness: default_otm_log_moneyness(),
            leg_amount: default_leg_amount(),
        }
    }
}

// =============================================================================
// [subscription] / [positions] / [persistence]
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSection {
    #[serde(default = "default_subscription_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_recompute_secs")]
    pub recompute_secs: u64,
    /// Retry delay while prices or strikes are still missing.
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
}

fn default_subscription_initial_delay_secs() -> u64 {
    20
}

fn default_recompute_secs() -> u64 {
    600
}

fn default_retry_secs() -> u64 {
    20
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_subscription_initial_delay_secs(),
            recompute_secs: default_recompute_secs(),
            retry_secs: default_retry_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionsSection {
    #[serde(default = "default_positions_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_positions_period_secs")]
    pub period_secs: u64,
}

fn default_positions_initial_delay_secs() -> u64 {
    10
}

fn default_positions_period_secs() -> u64 {
    60
}

impl Default for PositionsSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_positions_initial_delay_secs(),
            period_secs: default_positions_period_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceSection {
    /// Directory for the daily JSON-lines files. Unset keeps rows in memory.
    #[serde(default = "default_data_dir")]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

fn default_data_dir() -> Option<PathBuf> {
    Some(PathBuf::from("data"))
}

fn default_retention_secs() -> u64 {
    172_800
}

fn default_flush_every() -> usize {
    64
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retention_secs: default_retention_secs(),
            flush_every: default_flush_every(),
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub subscription: SubscriptionSection,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub positions: PositionsSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Reject configurations the tasks cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let expirations = self.expirations()?;
        if expirations.len() < 2 {
            return Err(AppError::Config(format!(
                "strategy.expirations needs at least two distinct expirations, got {}",
                expirations.len()
            )));
        }
        for proxy in self.perpetual_proxies()? {
            if !expirations.contains(&proxy) {
                return Err(AppError::Config(format!(
                    "perpetual proxy {} is not a selected expiration",
                    proxy.label()
                )));
            }
        }

        if self.strategy.currency.trim().is_empty() {
            return Err(AppError::Config("strategy.currency must not be empty".to_string()));
        }
        if self.strategy.leg_amount <= Decimal::ZERO {
            return Err(AppError::Config("strategy.leg_amount must be positive".to_string()));
        }
        if !self.strategy.otm_log_moneyness.is_finite() || self.strategy.otm_log_moneyness < 0.0 {
            return Err(AppError::Config(
                "strategy.otm_log_moneyness must be a non-negative number".to_string(),
            ));
        }

        let periods = [
            ("session.heartbeat_interval_secs", self.session.heartbeat_interval_secs),
            ("session.refresh_check_secs", self.session.refresh_check_secs),
            ("session.auth_timeout_secs", self.session.auth_timeout_secs),
            ("subscription.recompute_secs", self.subscription.recompute_secs),
            ("subscription.retry_secs", self.subscription.retry_secs),
            ("positions.period_secs", self.positions.period_secs),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(AppError::Config(format!("{name} must be positive")));
            }
        }
        if self.session.heartbeat_timeout_multiplier == 0 {
            return Err(AppError::Config(
                "session.heartbeat_timeout_multiplier must be positive".to_string(),
            ));
        }

        self.analytics.validate().map_err(AppError::Config)?;
        self.risk.validate().map_err(AppError::Config)?;
        self.execution.validate().map_err(AppError::Config)?;
        Ok(())
    }

    pub fn channels(&self) -> Channels {
        Channels::new(self.strategy.currency.trim())
    }

    /// Parsed expirations, near to far, without duplicates.
    pub fn expirations(&self) -> AppResult<Vec<Expiration>> {
        let mut parsed = parse_labels(&self.strategy.expirations)?;
        parsed.sort_by_key(Expiration::expiry_ts);
        parsed.dedup();
        Ok(parsed)
    }

    pub fn perpetual_proxies(&self) -> AppResult<Vec<Expiration>> {
        parse_labels(&self.strategy.perpetual_proxies)
    }

    /// Near is the first expiration, far the second.
    pub fn spread_target(&self) -> AppResult<SpreadTarget> {
        let mut expirations = self.expirations()?.into_iter();
        let (Some(near), Some(far)) = (expirations.next(), expirations.next()) else {
            return Err(AppError::Config(
                "strategy.expirations needs at least two expirations".to_string(),
            ));
        };
        Ok(SpreadTarget {
            channels: self.channels(),
            near,
            far,
            direction: self.strategy.direction,
            amount: self.strategy.leg_amount,
        })
    }

    pub fn session_config(&self, always_on_channels: Vec<String>) -> SessionConfig {
        let session = &self.session;
        SessionConfig {
            url: session.url().to_string(),
            heartbeat_interval: Duration::from_secs(session.heartbeat_interval_secs),
            heartbeat_timeout_multiplier: session.heartbeat_timeout_multiplier,
            refresh_check_interval: Duration::from_secs(session.refresh_check_secs),
            refresh_policy: RefreshPolicy {
                safety_margin: Duration::from_secs(session.refresh_margin_secs),
                testnet_refresh_after: Duration::from_secs(session.testnet_refresh_after_secs),
            },
            auth_timeout: Duration::from_secs(session.auth_timeout_secs),
            always_on_channels,
        }
    }

    /// Store settings. In-memory retention never exceeds the longest
    /// lookback any cycle queries.
    pub fn store_config(&self) -> StoreConfig {
        let longest_lookback = self.analytics.lookback_secs.max(self.risk.lookback_secs);
        let retention_secs = self.persistence.retention_secs.min(longest_lookback);
        let retention_ms = retention_secs.saturating_mul(1000);
        StoreConfig {
            data_dir: self.persistence.data_dir.clone(),
            retention_ms: i64::try_from(retention_ms).unwrap_or(i64::MAX),
            flush_every: self.persistence.flush_every.max(1),
        }
    }
}

fn parse_labels(labels: &[String]) -> AppResult<Vec<Expiration>> {
    labels
        .iter()
        .map(|label| Expiration::parse(label).map_err(AppError::from))
        .collect()
}
