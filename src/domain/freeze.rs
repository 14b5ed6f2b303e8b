//! Freeze records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AccountId, FreezeId, GroupId, ParticipantKey};

/// Reason recorded for freezes triggered by the drawdown policy.
pub const DRAWDOWN_REASON: &str = "drawdown threshold exceeded";

/// A persisted freeze of one participant.
///
/// The release timer is not part of the record; it lives in the engine's
/// timer registry and is re-derived from `release_time` on restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezeRecord {
    pub id: FreezeId,
    pub account_id: AccountId,
    pub group_id: GroupId,
    pub reason: String,
    pub automated: bool,
    pub frozen_at: DateTime<Utc>,
    pub release_time: DateTime<Utc>,
    pub initial_equity: Decimal,
    pub active: bool,
    pub released_at: Option<DateTime<Utc>>,
}

impl FreezeRecord {
    /// Open a new active freeze lasting `duration` from `now`.
    #[must_use]
    pub fn open(
        key: &ParticipantKey,
        reason: impl Into<String>,
        automated: bool,
        initial_equity: Decimal,
        now: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let duration = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Self {
            id: FreezeId::new(),
            account_id: key.account_id.clone(),
            group_id: key.group_id.clone(),
            reason: reason.into(),
            automated,
            frozen_at: now,
            release_time: now.checked_add_signed(duration).unwrap_or(DateTime::<Utc>::MAX_UTC),
            initial_equity,
            active: true,
            released_at: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> ParticipantKey {
        ParticipantKey::new(self.group_id.clone(), self.account_id.clone())
    }

    /// Time left until release, or `None` if the release time has passed.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.release_time - now)
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// Mark the record released at `at`.
    pub fn release(&mut self, at: DateTime<Utc>) {
        self.active = false;
        self.released_at = Some(at);
    }
}
