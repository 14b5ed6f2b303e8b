//! Trading data mirrored from the brokerage terminal.
//!
//! Field names follow the broker's JSON (camelCase) so that REST payloads and
//! push events deserialize straight into these types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{DealId, OrderId, PositionId};

/// Account-level figures reported by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInformation {
    #[serde(default)]
    pub name: Option<String>,
    pub balance: Decimal,
    pub equity: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

/// An open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: String,
    pub volume: Decimal,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub profit: Option<Decimal>,
}

/// A pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volume: Decimal,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub state: Option<String>,
}

/// A completed deal from the account's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: DealId,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub profit: Option<Decimal>,
    pub time: DateTime<Utc>,
}

impl Deal {
    /// Whether the deal is a trade, as opposed to a balance operation.
    #[must_use]
    pub fn is_trade(&self) -> bool {
        self.kind.starts_with("DEAL_TYPE_BUY") || self.kind.starts_with("DEAL_TYPE_SELL")
    }
}

/// Snapshot of a terminal: account figures plus open positions and orders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalState {
    pub account_information: AccountInformation,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub orders: Vec<Order>,
}
