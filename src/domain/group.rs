//! Competition groups.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::GroupId;

/// A competition group: a set of participants ranked against each other and
/// governed by one drawdown policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    /// Percent drawdown that triggers a freeze. Zero disables freezing.
    pub freeze_threshold: Decimal,
    /// Freeze cool-down in milliseconds. Zero means "use the configured default".
    pub freeze_duration_ms: u64,
    /// Reference balance for the group-wide P&L percentage.
    pub initial_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Build a group, validating the threshold and balance.
    pub fn try_new(
        id: GroupId,
        name: impl Into<String>,
        freeze_threshold: Decimal,
        freeze_duration_ms: u64,
        initial_balance: Decimal,
    ) -> Result<Self, DomainError> {
        if freeze_threshold.is_sign_negative() {
            return Err(DomainError::NegativeThreshold {
                threshold: freeze_threshold,
            });
        }
        if initial_balance.is_sign_negative() {
            return Err(DomainError::NegativeBalance {
                balance: initial_balance,
            });
        }
        Ok(Self {
            id,
            name: name.into(),
            description: String::new(),
            freeze_threshold,
            freeze_duration_ms,
            initial_balance,
            created_at: Utc::now(),
        })
    }

    /// Whether drawdown breaches in this group lead to a freeze at all.
    #[must_use]
    pub fn freezing_enabled(&self) -> bool {
        self.freeze_threshold > Decimal::ZERO
    }

    /// Cool-down for freezes in this group, falling back to `default` when
    /// the group does not set one.
    #[must_use]
    pub fn freeze_duration_or(&self, default: Duration) -> Duration {
        if self.freeze_duration_ms == 0 {
            default
        } else {
            Duration::from_millis(self.freeze_duration_ms)
        }
    }
}
