//! Database row types for Diesel ORM and their domain conversions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use super::schema::{competition_groups, deals, freezes, participants, users};
use crate::domain::{
    AccountId, Deal, FreezeId, FreezeRecord, Group, GroupId, ParticipantRecord, TrackerId, UserId,
    UserProfile,
};
use crate::error::{Error, Result};

/// Database row for a group.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = competition_groups)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub freeze_threshold: String,
    pub freeze_duration_ms: i64,
    pub initial_balance: String,
    pub created_at: String,
}

/// Database row for a user profile.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

/// Database row for a participant.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = participants)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ParticipantRow {
    pub group_id: String,
    pub account_id: String,
    pub user_id: String,
    pub status: String,
    pub initial_balance: Option<String>,
    pub tracker_id: Option<String>,
    pub joined_at: String,
}

/// Database row for a deal. The full deal is kept as JSON.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = deals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DealRow {
    pub account_id: String,
    pub deal_id: String,
    pub time: String,
    pub payload: String,
}

/// Database row for a freeze record.
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = freezes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FreezeRow {
    pub id: String,
    pub account_id: String,
    pub group_id: String,
    pub reason: String,
    pub automated: i32,
    pub frozen_at: String,
    pub release_time: String,
    pub initial_equity: String,
    pub active: i32,
    pub released_at: Option<String>,
}

pub(super) fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Parse(e.to_string()))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .map_err(|e| Error::Parse(format!("decimal '{s}': {e}")))
}

impl From<&Group> for GroupRow {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id.to_string(),
            name: group.name.clone(),
            description: group.description.clone(),
            freeze_threshold: group.freeze_threshold.to_string(),
            freeze_duration_ms: i64::try_from(group.freeze_duration_ms).unwrap_or(i64::MAX),
            initial_balance: group.initial_balance.to_string(),
            created_at: group.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<GroupRow> for Group {
    type Error = Error;

    fn try_from(row: GroupRow) -> Result<Self> {
        Ok(Self {
            id: GroupId::from(row.id),
            name: row.name,
            description: row.description,
            freeze_threshold: parse_decimal(&row.freeze_threshold)?,
            freeze_duration_ms: u64::try_from(row.freeze_duration_ms).unwrap_or(0),
            initial_balance: parse_decimal(&row.initial_balance)?,
            created_at: parse_time(&row.created_at)?,
        })
    }
}

impl From<&UserProfile> for UserRow {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: user.id.to_string(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from(row.id),
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone_number: row.phone_number,
        }
    }
}

impl From<&ParticipantRecord> for ParticipantRow {
    fn from(record: &ParticipantRecord) -> Self {
        Self {
            group_id: record.group_id.to_string(),
            account_id: record.account_id.to_string(),
            user_id: record.user_id.to_string(),
            status: record.status.as_str().to_string(),
            initial_balance: record.initial_balance.map(|b| b.to_string()),
            tracker_id: record.tracker_id.as_ref().map(ToString::to_string),
            joined_at: record.joined_at.to_rfc3339(),
        }
    }
}

impl TryFrom<ParticipantRow> for ParticipantRecord {
    type Error = Error;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Self {
            group_id: GroupId::from(row.group_id),
            account_id: AccountId::from(row.account_id),
            user_id: UserId::from(row.user_id),
            status: row.status.parse()?,
            initial_balance: row.initial_balance.as_deref().map(parse_decimal).transpose()?,
            tracker_id: row.tracker_id.map(TrackerId::from),
            joined_at: parse_time(&row.joined_at)?,
        })
    }
}

impl DealRow {
    pub fn from_deal(account: &AccountId, deal: &Deal) -> Result<Self> {
        Ok(Self {
            account_id: account.to_string(),
            deal_id: deal.id.to_string(),
            time: deal.time.to_rfc3339(),
            payload: serde_json::to_string(deal)?,
        })
    }

    pub fn into_deal(self) -> Result<Deal> {
        serde_json::from_str(&self.payload).map_err(|e| Error::Parse(e.to_string()))
    }
}

impl From<&FreezeRecord> for FreezeRow {
    fn from(record: &FreezeRecord) -> Self {
        Self {
            id: record.id.to_string(),
            account_id: record.account_id.to_string(),
            group_id: record.group_id.to_string(),
            reason: record.reason.clone(),
            automated: i32::from(record.automated),
            frozen_at: record.frozen_at.to_rfc3339(),
            release_time: record.release_time.to_rfc3339(),
            initial_equity: record.initial_equity.to_string(),
            active: i32::from(record.active),
            released_at: record.released_at.map(|t| t.to_rfc3339()),
        }
    }
}

impl TryFrom<FreezeRow> for FreezeRecord {
    type Error = Error;

    fn try_from(row: FreezeRow) -> Result<Self> {
        Ok(Self {
            id: FreezeId::from(row.id),
            account_id: AccountId::from(row.account_id),
            group_id: GroupId::from(row.group_id),
            reason: row.reason,
            automated: row.automated != 0,
            frozen_at: parse_time(&row.frozen_at)?,
            release_time: parse_time(&row.release_time)?,
            initial_equity: parse_decimal(&row.initial_equity)?,
            active: row.active != 0,
            released_at: row.released_at.as_deref().map(parse_time).transpose()?,
        })
    }
}
