//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file. The broker API token is only
//! ever taken from the `METAAPI_TOKEN` environment variable.

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::application::DeskSettings;
use crate::error::{ConfigError, Result};
use crate::port::TrackerPeriod;

/// Environment variable holding the MetaApi token.
pub const TOKEN_ENV: &str = "METAAPI_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".into()
}

fn default_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

/// Cache refresh cadence and history bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_structural_refresh_secs")]
    pub structural_refresh_secs: u64,
    #[serde(default = "default_trading_refresh_ms")]
    pub trading_refresh_ms: u64,
    #[serde(default = "default_deal_history_limit")]
    pub deal_history_limit: usize,
    /// Queue deals for accounts the cache does not know yet.
    #[serde(default = "default_true")]
    pub queue_unknown_deals: bool,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

const fn default_structural_refresh_secs() -> u64 {
    30
}

const fn default_trading_refresh_ms() -> u64 {
    2000
}

const fn default_deal_history_limit() -> usize {
    100
}

const fn default_event_buffer() -> usize {
    1024
}

const fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            structural_refresh_secs: default_structural_refresh_secs(),
            trading_refresh_ms: default_trading_refresh_ms(),
            deal_history_limit: default_deal_history_limit(),
            queue_unknown_deals: true,
            event_buffer: default_event_buffer(),
        }
    }
}

/// Freeze behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Cool-down for groups whose own duration is zero.
    #[serde(default = "default_freeze_duration_secs")]
    pub default_freeze_duration_secs: u64,
    /// Liquidate orders and positions that appear while frozen.
    #[serde(default = "default_true")]
    pub enforce_while_frozen: bool,
    #[serde(default)]
    pub tracker_period: TrackerPeriod,
}

const fn default_freeze_duration_secs() -> u64 {
    3600
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_freeze_duration_secs: default_freeze_duration_secs(),
            enforce_while_frozen: true,
            tracker_period: TrackerPeriod::default(),
        }
    }
}

/// Which broker gateway to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Metaapi,
    /// Simulated accounts; nothing leaves the process.
    Paper,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub kind: GatewayKind,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_sync_retries")]
    pub sync_retries: u32,
    #[serde(default = "default_sync_retry_delay_ms")]
    pub sync_retry_delay_ms: u64,
    #[serde(default = "default_deal_poll_secs")]
    pub deal_poll_secs: u64,
    #[serde(default = "default_tracker_poll_secs")]
    pub tracker_poll_secs: u64,
    /// Starting balance of accounts opened by the paper gateway.
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
    /// Loaded from the environment, never from the file.
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_region() -> String {
    "new-york".into()
}

fn default_domain() -> String {
    "agiliumtrade.agiliumtrade.ai".into()
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

const fn default_sync_retries() -> u32 {
    5
}

const fn default_sync_retry_delay_ms() -> u64 {
    1000
}

const fn default_deal_poll_secs() -> u64 {
    10
}

const fn default_tracker_poll_secs() -> u64 {
    5
}

fn default_paper_balance() -> Decimal {
    dec!(10000)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::default(),
            region: default_region(),
            domain: default_domain(),
            request_timeout_ms: default_request_timeout_ms(),
            sync_retries: default_sync_retries(),
            sync_retry_delay_ms: default_sync_retry_delay_ms(),
            deal_poll_secs: default_deal_poll_secs(),
            tracker_poll_secs: default_tracker_poll_secs(),
            paper_balance: default_paper_balance(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "riskboard.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            url: default_database_url(),
        }
    }
}

impl Config {
    /// Load, read the token from the environment and validate.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let mut config = Self::parse_toml(&content)?;
        config.gateway.token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        Ok(config)
    }

    /// Parse and validate a TOML document without touching the environment.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        let intervals = [
            ("cache.structural_refresh_secs", self.cache.structural_refresh_secs),
            ("cache.trading_refresh_ms", self.cache.trading_refresh_ms),
            ("gateway.request_timeout_ms", self.gateway.request_timeout_ms),
            ("gateway.deal_poll_secs", self.gateway.deal_poll_secs),
            ("gateway.tracker_poll_secs", self.gateway.tracker_poll_secs),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".into(),
                }
                .into());
            }
        }
        if self.cache.deal_history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.deal_history_limit",
                reason: "must be greater than zero".into(),
            }
            .into());
        }
        if self.database.backend == DatabaseBackend::Sqlite && self.database.url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "database.url",
            }
            .into());
        }
        if self.gateway.paper_balance.is_sign_negative() {
            return Err(ConfigError::InvalidValue {
                field: "gateway.paper_balance",
                reason: "cannot be negative".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Fail if the configured gateway needs a token that is absent.
    #[allow(clippy::result_large_err)]
    pub fn require_token(&self) -> Result<&str> {
        match (self.gateway.kind, self.gateway.token.as_deref()) {
            (GatewayKind::Paper, _) => Ok(""),
            (GatewayKind::Metaapi, Some(token)) => Ok(token),
            (GatewayKind::Metaapi, None) => Err(ConfigError::MissingField { field: TOKEN_ENV }.into()),
        }
    }

    pub fn init_logging(&self) {
        self.logging.init();
    }

    #[must_use]
    pub fn desk_settings(&self) -> DeskSettings {
        DeskSettings {
            structural_refresh: Duration::from_secs(self.cache.structural_refresh_secs),
            trading_refresh: Duration::from_millis(self.cache.trading_refresh_ms),
            deal_history_limit: self.cache.deal_history_limit,
            queue_unknown_deals: self.cache.queue_unknown_deals,
            default_freeze_duration: Duration::from_secs(self.risk.default_freeze_duration_secs),
            enforce_while_frozen: self.risk.enforce_while_frozen,
            tracker_period: self.risk.tracker_period,
            event_buffer: self.cache.event_buffer,
        }
    }

    #[cfg(feature = "metaapi")]
    #[must_use]
    pub fn metaapi_settings(&self, token: &str) -> crate::adapter::metaapi::MetaApiSettings {
        crate::adapter::metaapi::MetaApiSettings {
            token: token.to_string(),
            region: self.gateway.region.clone(),
            domain: self.gateway.domain.clone(),
            request_timeout: Duration::from_millis(self.gateway.request_timeout_ms),
            sync_retries: self.gateway.sync_retries,
            sync_retry_delay: Duration::from_millis(self.gateway.sync_retry_delay_ms),
            deal_poll_interval: Duration::from_secs(self.gateway.deal_poll_secs),
            deal_history_limit: self.cache.deal_history_limit,
        }
    }
}
