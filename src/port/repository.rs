//! Persistence port for groups, participants, users, deals and freeze records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    AccountId, Deal, FreezeId, FreezeRecord, Group, GroupId, ParticipantKey, ParticipantRecord,
    ParticipantStatus, TrackerId, UserId, UserProfile,
};
use crate::error::Result;

/// Storage operations backing the state cache and the freeze engine.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All groups.
    async fn groups(&self) -> Result<Vec<Group>>;

    /// One group by id.
    async fn group(&self, id: &GroupId) -> Result<Option<Group>>;

    /// Participants of a group with the given status.
    async fn participants(
        &self,
        group: &GroupId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>>;

    /// Set the status of an account's enrollment in `group`, or in every
    /// group when `group` is `None`. Returns the number of records updated.
    async fn set_participant_status(
        &self,
        account: &AccountId,
        group: Option<&GroupId>,
        status: ParticipantStatus,
    ) -> Result<usize>;

    /// Store a new drawdown baseline and, optionally, the tracker watching it.
    async fn update_participant_baseline(
        &self,
        key: &ParticipantKey,
        baseline: Decimal,
        tracker: Option<&TrackerId>,
    ) -> Result<()>;

    /// User profile by id.
    async fn user(&self, id: &UserId) -> Result<Option<UserProfile>>;

    /// Most recent `limit` deals of an account, oldest first.
    async fn deals(&self, account: &AccountId, limit: usize) -> Result<Vec<Deal>>;

    /// Store a deal. Returns `false` if the deal id was already stored.
    async fn record_deal(&self, account: &AccountId, deal: &Deal) -> Result<bool>;

    /// Insert a freeze record.
    async fn create_freeze(&self, record: &FreezeRecord) -> Result<()>;

    /// All active freeze records, oldest first.
    async fn active_freezes(&self) -> Result<Vec<FreezeRecord>>;

    /// Number of freeze records ever created for a participant.
    async fn freeze_history(&self, key: &ParticipantKey) -> Result<u32>;

    /// Release every active record of a participant. Returns the count released.
    async fn release_freezes(&self, key: &ParticipantKey, at: DateTime<Utc>) -> Result<usize>;

    /// Release one record by id.
    async fn deactivate_freeze(&self, id: &FreezeId, at: DateTime<Utc>) -> Result<()>;

    /// Insert or replace a group.
    async fn save_group(&self, group: &Group) -> Result<()>;

    /// Insert or replace a participant record.
    async fn save_participant(&self, record: &ParticipantRecord) -> Result<()>;

    /// Insert or replace a user profile.
    async fn save_user(&self, user: &UserProfile) -> Result<()>;
}
