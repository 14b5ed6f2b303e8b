//! Brokerage gateway port.
//!
//! A gateway hands out live connections to trading accounts. Connections
//! mirror the account's terminal state and accept the two trade actions the
//! freeze engine needs: closing positions and cancelling orders. Push events
//! from the broker are delivered through the [`EventSink`] given at connect
//! time.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{
    AccountEvent, AccountId, OrderId, ParticipantKey, PositionId, TerminalState, TrackerId,
};
use crate::error::Result;

/// Channel on which connections publish push events.
pub type EventSink = mpsc::Sender<AccountEvent>;

/// Factory for account connections.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Connect to the account identified by `key` and start delivering its
    /// push events to `events`.
    async fn connect(
        &self,
        key: &ParticipantKey,
        events: EventSink,
    ) -> Result<Arc<dyn AccountConnection>>;

    /// Gateway name for logging.
    fn name(&self) -> &'static str;
}

/// A live connection to one trading account.
#[async_trait]
pub trait AccountConnection: Send + Sync {
    /// The participant this connection was opened for.
    fn key(&self) -> &ParticipantKey;

    /// Broker-side account name, once known.
    fn account_name(&self) -> Option<String>;

    /// Whether the connection is currently usable.
    fn is_connected(&self) -> bool;

    /// Re-establish a stale connection.
    async fn reconnect(&self) -> Result<()>;

    /// Current terminal snapshot.
    async fn terminal_state(&self) -> Result<TerminalState>;

    /// Close an open position.
    async fn close_position(&self, id: &PositionId) -> Result<()>;

    /// Cancel a pending order.
    async fn cancel_order(&self, id: &OrderId) -> Result<()>;
}

/// Evaluation window for a drawdown tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerPeriod {
    Day,
    Week,
    Month,
    #[default]
    Lifetime,
}

impl TrackerPeriod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Lifetime => "lifetime",
        }
    }
}

/// Parameters of a drawdown tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSpec {
    pub name: String,
    /// Drawdown threshold in percent.
    pub threshold_percent: rust_decimal::Decimal,
    pub period: TrackerPeriod,
}

/// External drawdown-tracking service.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    /// Create a tracker for `account` and return its handle.
    async fn create_tracker(&self, account: &AccountId, spec: &TrackerSpec) -> Result<TrackerId>;

    /// Remove a tracker.
    async fn remove_tracker(&self, account: &AccountId, tracker: &TrackerId) -> Result<()>;
}

/// Tracker service that does nothing, for deployments without one.
pub struct NoopTrackerApi;

#[async_trait]
impl TrackerApi for NoopTrackerApi {
    async fn create_tracker(&self, account: &AccountId, spec: &TrackerSpec) -> Result<TrackerId> {
        Ok(TrackerId::new(format!("noop:{account}:{}", spec.name)))
    }

    async fn remove_tracker(&self, _account: &AccountId, _tracker: &TrackerId) -> Result<()> {
        Ok(())
    }
}
