//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path given with `--config`) and
//! deserializes into strongly-typed structs. The exchange key and secret
//! are referenced by env-var name in the config and resolved at startup.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::OrderState;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub balancing: BalancingConfig,
    pub cancel: CancelConfig,
    pub quota: QuotaConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    /// REST base URL, e.g. `https://big.one/api/v2`.
    pub endpoint: String,
    pub app_key_env: String,
    pub app_secret_env: String,
    /// Market name such as `ONE-USDT` (matched case-insensitively).
    pub symbol_pair: String,
    pub request_timeout_ms: u64,
    /// Wait between startup attempts when the exchange is unreachable.
    #[serde(default = "default_create_client_wait_ms")]
    pub create_client_wait_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// Size of each BID/ASK pair. The balancer may shrink this at runtime.
    pub exchange_amount: f64,
    pub exchange_interval_secs: u64,
    /// Subtracted from the ask to get the order price.
    #[serde(default)]
    pub expected_spread: f64,
    /// Minimum wall-clock duration of one balance check.
    #[serde(default)]
    pub check_balance_relay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BalancingConfig {
    pub enabled: bool,
    /// Share of `exchange_amount` used for a replenishment order.
    pub balance_percent: u32,
    /// Scale of a rebalancing trade, and the factor the trade amount
    /// is shrunk to when both assets run short.
    pub balance_exchange_percent: u32,
    /// Pause the canceller while a rebalance is running.
    #[serde(default)]
    pub lock_canceller: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CancelConfig {
    pub interval_secs: u64,
    /// Orders fetched per state per scan.
    pub page_size: u32,
    /// Orders older than this (by exchange clock) are cancelled.
    pub drift_threshold_ms: u64,
    pub order_states: Vec<OrderState>,
    /// Pause after each cancellation.
    #[serde(default)]
    pub pause_ms: u64,
    /// Pause the trader while a scan is running.
    #[serde(default)]
    pub lock_trader: bool,
    #[serde(default)]
    pub cancel_all_on_shutdown: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    pub enabled: bool,
    /// Trading stops once this share of the hourly limit is consumed.
    pub threshold_percent: u32,
    pub check_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 18080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
        }
    }
}

fn default_create_client_wait_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "error".to_string()
}

/// Validation failures, one per offending field.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{field} must be in 1..=100, got {value}")]
    Percent { field: &'static str, value: u32 },

    #[error("cancel.order_states must list at least one of PENDING/FILLED/CANCELED")]
    NoOrderStates,

    #[error("Unknown log level: {0}")]
    LogLevel(String),
}

/// API credentials resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[redacted]")
            .finish()
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check every bound the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ex = &self.exchange;
        if ex.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("exchange.endpoint"));
        }
        if ex.app_key_env.trim().is_empty() {
            return Err(ConfigError::Missing("exchange.app_key_env"));
        }
        if ex.app_secret_env.trim().is_empty() {
            return Err(ConfigError::Missing("exchange.app_secret_env"));
        }
        if ex.symbol_pair.trim().is_empty() {
            return Err(ConfigError::Missing("exchange.symbol_pair"));
        }
        if ex.request_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("exchange.request_timeout_ms"));
        }

        if !(self.trading.exchange_amount > 0.0) {
            return Err(ConfigError::NotPositive("trading.exchange_amount"));
        }
        if self.trading.exchange_interval_secs == 0 {
            return Err(ConfigError::NotPositive("trading.exchange_interval_secs"));
        }

        check_percent("balancing.balance_percent", self.balancing.balance_percent)?;
        check_percent(
            "balancing.balance_exchange_percent",
            self.balancing.balance_exchange_percent,
        )?;

        if self.cancel.interval_secs == 0 {
            return Err(ConfigError::NotPositive("cancel.interval_secs"));
        }
        if self.cancel.page_size == 0 {
            return Err(ConfigError::NotPositive("cancel.page_size"));
        }
        if self.cancel.drift_threshold_ms == 0 {
            return Err(ConfigError::NotPositive("cancel.drift_threshold_ms"));
        }
        if self.cancel.order_states.is_empty() {
            return Err(ConfigError::NoOrderStates);
        }

        check_percent("quota.threshold_percent", self.quota.threshold_percent)?;
        if self.quota.check_interval_secs == 0 {
            return Err(ConfigError::NotPositive("quota.check_interval_secs"));
        }

        normalize_log_level(&self.logging.level)?;
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl ExchangeConfig {
    /// Read the API key and secret from the configured env vars.
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            app_key: AppConfig::resolve_env(&self.app_key_env)?,
            app_secret: SecretString::new(AppConfig::resolve_env(&self.app_secret_env)?),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl BalancingConfig {
    /// `balance_percent` as a fraction.
    pub fn balance_fraction(&self) -> f64 {
        f64::from(self.balance_percent) / 100.0
    }

    /// `balance_exchange_percent` as a fraction.
    pub fn exchange_fraction(&self) -> f64 {
        f64::from(self.balance_exchange_percent) / 100.0
    }
}

/// Map a configured level onto a `tracing` level name.
pub fn normalize_log_level(level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" | "warnning" => Ok("warn"),
        "error" => Ok("error"),
        _ => Err(ConfigError::LogLevel(level.to_string())),
    }
}

fn check_percent(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 || value > 100 {
        return Err(ConfigError::Percent { field, value });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
[exchange]
endpoint = "https://big.one/api/v2"
app_key_env = "B1BOT_TEST_KEY"
app_secret_env = "B1BOT_TEST_SECRET"
symbol_pair = "one-usdt"
request_timeout_ms = 5000

[trading]
exchange_amount = 1.0
exchange_interval_secs = 10
expected_spread = 0.0
check_balance_relay_ms = 0

[balancing]
enabled = true
balance_percent = 50
balance_exchange_percent = 50
lock_canceller = true

[cancel]
interval_secs = 30
page_size = 20
drift_threshold_ms = 60000
order_states = ["PENDING", "CANCLED"]
pause_ms = 0
lock_trader = true

[quota]
enabled = true
threshold_percent = 80
check_interval_secs = 60
"#;
