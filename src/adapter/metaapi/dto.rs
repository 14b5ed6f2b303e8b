//! Wire types for the MetaApi REST endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, TrackerId};

/// Provisioning view of an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    #[serde(rename = "_id")]
    pub id: AccountId,
    #[serde(default)]
    pub name: Option<String>,
    /// Deployment state, e.g. `DEPLOYED` or `UNDEPLOYED`.
    pub state: String,
    /// Broker connection status, e.g. `CONNECTED`.
    #[serde(default)]
    pub connection_status: Option<String>,
}

impl AccountDto {
    #[must_use]
    pub fn is_deployed(&self) -> bool {
        matches!(self.state.as_str(), "DEPLOYING" | "DEPLOYED")
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_status.as_deref() == Some("CONNECTED")
    }
}

/// Trade request body.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "actionType")]
pub enum TradeRequest {
    #[serde(rename = "POSITION_CLOSE_ID", rename_all = "camelCase")]
    ClosePosition { position_id: String },
    #[serde(rename = "ORDER_CANCEL", rename_all = "camelCase")]
    CancelOrder { order_id: String },
}

/// Trade response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub string_code: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl TradeResponse {
    /// MetaTrader return codes that mean the request was accepted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self.string_code.as_str(),
            "ERR_NO_ERROR" | "TRADE_RETCODE_DONE" | "TRADE_RETCODE_PLACED" | "TRADE_RETCODE_DONE_PARTIAL"
        )
    }
}

/// Tracker creation body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackerDto<'a> {
    pub name: &'a str,
    pub period: &'a str,
    /// Fraction, not percent: `0.05` is a 5% drawdown.
    pub relative_drawdown_threshold: rust_decimal::Decimal,
}

/// Tracker creation response.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerIdDto {
    pub id: TrackerId,
}

/// Tracker details.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerDto {
    #[serde(rename = "_id")]
    pub id: TrackerId,
    pub name: String,
}

/// One tracker event from the event stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerEventDto {
    pub sequence_number: u64,
    pub account_id: AccountId,
    pub tracker_id: TrackerId,
    pub exceeded_threshold_type: String,
    #[serde(default)]
    pub relative_drawdown: Option<rust_decimal::Decimal>,
}
