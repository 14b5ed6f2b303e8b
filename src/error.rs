use thiserror::Error;

use crate::domain::error::DomainError;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Errors raised by the brokerage gateway and its connections.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("account {account_id} is not connected")]
    NotConnected { account_id: String },

    #[error("account {account_id} not found at the broker")]
    AccountNotFound { account_id: String },

    #[error("broker rejected {action}: {reason}")]
    Rejected { action: String, reason: String },

    #[error("timed out waiting for {what}")]
    Timeout { what: String },

    #[error("malformed event payload: {0}")]
    MalformedEvent(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("group {0} is not known to the cache")]
    GroupNotFound(String),

    #[error("participant {0} is not known to the cache")]
    ParticipantNotFound(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Lifecycle(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error came from an external call that the next cycle may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Gateway(GatewayError::NotConnected { .. } | GatewayError::Timeout { .. })
                | Self::Http(_)
                | Self::Connection(_)
                | Self::Database(_)
        )
    }
}
