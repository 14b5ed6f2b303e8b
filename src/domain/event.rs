//! Push events emitted by broker connections and the drawdown tracker.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OrderId, ParticipantKey, PositionId, TrackerId};
use super::trading::{AccountInformation, Deal, Order, Position};
use crate::error::GatewayError;

/// An event concerning one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    #[serde(flatten)]
    pub key: ParticipantKey,
    #[serde(flatten)]
    pub kind: AccountEventKind,
}

/// Closed set of event kinds. Every variant carries its required payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum AccountEventKind {
    AccountInformationUpdated {
        information: AccountInformation,
    },
    OrderUpdated {
        order: Order,
    },
    OrdersReplaced {
        orders: Vec<Order>,
    },
    OrderCompleted {
        order_id: OrderId,
    },
    PositionUpdated {
        position: Position,
    },
    PositionsReplaced {
        positions: Vec<Position>,
    },
    PositionRemoved {
        position_id: PositionId,
    },
    DealAdded {
        deal: Deal,
    },
    DrawdownExceeded {
        tracker_id: TrackerId,
        relative_drawdown: Decimal,
    },
}

impl AccountEventKind {
    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AccountInformationUpdated { .. } => "account_information",
            Self::OrderUpdated { .. } => "order_updated",
            Self::OrdersReplaced { .. } => "orders_replaced",
            Self::OrderCompleted { .. } => "order_completed",
            Self::PositionUpdated { .. } => "position_updated",
            Self::PositionsReplaced { .. } => "positions_replaced",
            Self::PositionRemoved { .. } => "position_removed",
            Self::DealAdded { .. } => "deal_added",
            Self::DrawdownExceeded { .. } => "drawdown_exceeded",
        }
    }

    /// Whether the event reports order or position activity.
    #[must_use]
    pub const fn is_trading_activity(&self) -> bool {
        matches!(
            self,
            Self::OrderUpdated { .. }
                | Self::OrdersReplaced { .. }
                | Self::PositionUpdated { .. }
                | Self::PositionsReplaced { .. }
        )
    }
}

impl AccountEvent {
    #[must_use]
    pub const fn new(key: ParticipantKey, kind: AccountEventKind) -> Self {
        Self { key, kind }
    }

    /// Decode a raw JSON payload, rejecting unknown kinds, missing fields
    /// and blank identifiers.
    pub fn decode(raw: &str) -> Result<Self, GatewayError> {
        let event: Self =
            serde_json::from_str(raw).map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;
        if event.key.account_id.as_str().is_empty() || event.key.group_id.as_str().is_empty() {
            return Err(GatewayError::MalformedEvent(
                "event identifiers cannot be empty".into(),
            ));
        }
        Ok(event)
    }
}
