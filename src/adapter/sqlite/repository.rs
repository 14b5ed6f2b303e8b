//! SQLite repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use super::connection::DbPool;
use super::model::{DealRow, FreezeRow, GroupRow, ParticipantRow, UserRow};
use super::schema::{competition_groups, deals, freezes, participants, users};
use crate::domain::{
    AccountId, Deal, FreezeId, FreezeRecord, Group, GroupId, ParticipantKey, ParticipantRecord,
    ParticipantStatus, TrackerId, UserId, UserProfile,
};
use crate::error::{Error, Result};
use crate::port::Repository;

type PooledConn = diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>;

/// SQLite-backed repository.
pub struct SqliteRepository {
    pool: DbPool,
}

impl SqliteRepository {
    /// Create a repository over an already migrated pool.
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConn> {
        self.pool
            .get()
            .map_err(|e| Error::Connection(e.to_string()))
    }
}

fn db(e: diesel::result::Error) -> Error {
    Error::Database(e.to_string())
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn groups(&self) -> Result<Vec<Group>> {
        let mut conn = self.conn()?;
        let rows: Vec<GroupRow> = competition_groups::table
            .order(competition_groups::created_at.asc())
            .select(GroupRow::as_select())
            .load(&mut conn)
            .map_err(db)?;
        rows.into_iter().map(Group::try_from).collect()
    }

    async fn group(&self, id: &GroupId) -> Result<Option<Group>> {
        let mut conn = self.conn()?;
        let row: Option<GroupRow> = competition_groups::table
            .find(id.as_str())
            .select(GroupRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(db)?;
        row.map(Group::try_from).transpose()
    }

    async fn participants(
        &self,
        group: &GroupId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>> {
        let mut conn = self.conn()?;
        let rows: Vec<ParticipantRow> = participants::table
            .filter(participants::group_id.eq(group.as_str()))
            .filter(participants::status.eq(status.as_str()))
            .order(participants::joined_at.asc())
            .select(ParticipantRow::as_select())
            .load(&mut conn)
            .map_err(db)?;
        rows.into_iter().map(ParticipantRecord::try_from).collect()
    }

    async fn set_participant_status(
        &self,
        account: &AccountId,
        group: Option<&GroupId>,
        status: ParticipantStatus,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let by_account = participants::account_id.eq(account.as_str());
        let updated = match group {
            Some(group) => diesel::update(
                participants::table
                    .filter(by_account)
                    .filter(participants::group_id.eq(group.as_str())),
            )
            .set(participants::status.eq(status.as_str()))
            .execute(&mut conn),
            None => diesel::update(participants::table.filter(by_account))
                .set(participants::status.eq(status.as_str()))
                .execute(&mut conn),
        }
        .map_err(db)?;
        Ok(updated)
    }

    async fn update_participant_baseline(
        &self,
        key: &ParticipantKey,
        baseline: Decimal,
        tracker: Option<&TrackerId>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let target = participants::table.find((key.group_id.as_str(), key.account_id.as_str()));
        let baseline = Some(baseline.to_string());
        let updated = match tracker {
            Some(tracker) => diesel::update(target)
                .set((
                    participants::initial_balance.eq(baseline),
                    participants::tracker_id.eq(Some(tracker.as_str())),
                ))
                .execute(&mut conn),
            None => diesel::update(target)
                .set(participants::initial_balance.eq(baseline))
                .execute(&mut conn),
        }
        .map_err(db)?;
        if updated == 0 {
            return Err(Error::ParticipantNotFound(key.to_string()));
        }
        Ok(())
    }

    async fn user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        let mut conn = self.conn()?;
        let row: Option<UserRow> = users::table
            .find(id.as_str())
            .select(UserRow::as_select())
            .first(&mut conn)
            .optional()
            .map_err(db)?;
        Ok(row.map(UserProfile::from))
    }

    async fn deals(&self, account: &AccountId, limit: usize) -> Result<Vec<Deal>> {
        let mut conn = self.conn()?;
        let rows: Vec<DealRow> = deals::table
            .filter(deals::account_id.eq(account.as_str()))
            .order(deals::time.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(DealRow::as_select())
            .load(&mut conn)
            .map_err(db)?;
        let mut deals = rows
            .into_iter()
            .map(DealRow::into_deal)
            .collect::<Result<Vec<_>>>()?;
        deals.reverse();
        Ok(deals)
    }

    async fn record_deal(&self, account: &AccountId, deal: &Deal) -> Result<bool> {
        let row = DealRow::from_deal(account, deal)?;
        let mut conn = self.conn()?;
        let inserted = diesel::insert_or_ignore_into(deals::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db)?;
        Ok(inserted == 1)
    }

    async fn create_freeze(&self, record: &FreezeRecord) -> Result<()> {
        let row = FreezeRow::from(record);
        let mut conn = self.conn()?;
        diesel::insert_into(freezes::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db)?;
        Ok(())
    }

    async fn active_freezes(&self) -> Result<Vec<FreezeRecord>> {
        let mut conn = self.conn()?;
        let rows: Vec<FreezeRow> = freezes::table
            .filter(freezes::active.eq(1))
            .order(freezes::frozen_at.asc())
            .select(FreezeRow::as_select())
            .load(&mut conn)
            .map_err(db)?;
        rows.into_iter().map(FreezeRecord::try_from).collect()
    }

    async fn freeze_history(&self, key: &ParticipantKey) -> Result<u32> {
        let mut conn = self.conn()?;
        let count: i64 = freezes::table
            .filter(freezes::account_id.eq(key.account_id.as_str()))
            .filter(freezes::group_id.eq(key.group_id.as_str()))
            .count()
            .get_result(&mut conn)
            .map_err(db)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn release_freezes(&self, key: &ParticipantKey, at: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let released = diesel::update(
            freezes::table
                .filter(freezes::account_id.eq(key.account_id.as_str()))
                .filter(freezes::group_id.eq(key.group_id.as_str()))
                .filter(freezes::active.eq(1)),
        )
        .set((
            freezes::active.eq(0),
            freezes::released_at.eq(Some(at.to_rfc3339())),
        ))
        .execute(&mut conn)
        .map_err(db)?;
        Ok(released)
    }

    async fn deactivate_freeze(&self, id: &FreezeId, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::update(freezes::table.find(id.as_str()))
            .set((
                freezes::active.eq(0),
                freezes::released_at.eq(Some(at.to_rfc3339())),
            ))
            .execute(&mut conn)
            .map_err(db)?;
        Ok(())
    }

    async fn save_group(&self, group: &Group) -> Result<()> {
        let row = GroupRow::from(group);
        let mut conn = self.conn()?;
        diesel::replace_into(competition_groups::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db)?;
        Ok(())
    }

    async fn save_participant(&self, record: &ParticipantRecord) -> Result<()> {
        let row = ParticipantRow::from(record);
        let mut conn = self.conn()?;
        diesel::replace_into(participants::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db)?;
        Ok(())
    }

    async fn save_user(&self, user: &UserProfile) -> Result<()> {
        let row = UserRow::from(user);
        let mut conn = self.conn()?;
        diesel::replace_into(users::table)
            .values(&row)
            .execute(&mut conn)
            .map_err(db)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sqlite::connection::{create_pool, run_migrations};
    use crate::domain::DealId;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn repo() -> SqliteRepository {
        let pool = create_pool(":memory:").unwrap();
        run_migrations(&pool).unwrap();
        SqliteRepository::new(pool)
    }

    fn record(group: &str, account: &str, status: ParticipantStatus) -> ParticipantRecord {
        ParticipantRecord {
            group_id: GroupId::new(group),
            account_id: AccountId::new(account),
            user_id: UserId::new("u1"),
            status,
            initial_balance: None,
            tracker_id: None,
            joined_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn groups_and_participants_round_trip() {
        let repo = repo();
        let group = Group::try_new(GroupId::new("g1"), "Cup", dec!(12.5), 60_000, dec!(10000))
            .unwrap();
        repo.save_group(&group).await.unwrap();
        repo.save_participant(&record("g1", "a1", ParticipantStatus::Approved))
            .await
            .unwrap();
        repo.save_participant(&record("g1", "a2", ParticipantStatus::Pending))
            .await
            .unwrap();

        let loaded = repo.group(&GroupId::new("g1")).await.unwrap().unwrap();
        assert_eq!(loaded.freeze_threshold, dec!(12.5));
        assert_eq!(loaded.freeze_duration_ms, 60_000);

        let approved = repo
            .participants(&GroupId::new("g1"), ParticipantStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].account_id.as_str(), "a1");
    }

    #[tokio::test]
    async fn status_update_targets_one_or_all_groups() {
        let repo = repo();
        repo.save_participant(&record("g1", "a1", ParticipantStatus::Approved))
            .await
            .unwrap();
        repo.save_participant(&record("g2", "a1", ParticipantStatus::Approved))
            .await
            .unwrap();

        let account = AccountId::new("a1");
        let n = repo
            .set_participant_status(&account, Some(&GroupId::new("g1")), ParticipantStatus::Disconnected)
            .await
            .unwrap();
        assert_eq!(n, 1);
        let n = repo
            .set_participant_status(&account, None, ParticipantStatus::Removed)
            .await
            .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn baseline_update_requires_existing_participant() {
        let repo = repo();
        let key = ParticipantKey::new("g1", "a1");
        let err = repo
            .update_participant_baseline(&key, dec!(900), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParticipantNotFound(_)));

        repo.save_participant(&record("g1", "a1", ParticipantStatus::Approved))
            .await
            .unwrap();
        repo.update_participant_baseline(&key, dec!(900), Some(&TrackerId::new("t1")))
            .await
            .unwrap();
        let approved = repo
            .participants(&GroupId::new("g1"), ParticipantStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved[0].initial_balance, Some(dec!(900)));
        assert_eq!(approved[0].tracker_id, Some(TrackerId::new("t1")));
    }

    #[tokio::test]
    async fn freeze_lifecycle_persists() {
        let repo = repo();
        let key = ParticipantKey::new("g1", "a1");
        let now = Utc::now();
        let rec = FreezeRecord::open(&key, "drawdown", true, dec!(850.25), now, Duration::from_secs(60));
        repo.create_freeze(&rec).await.unwrap();

        let active = repo.active_freezes().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].initial_equity, dec!(850.25));
        assert!(active[0].automated);

        assert_eq!(repo.release_freezes(&key, now).await.unwrap(), 1);
        assert!(repo.active_freezes().await.unwrap().is_empty());
        assert_eq!(repo.freeze_history(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_deals_are_ignored() {
        let repo = repo();
        let account = AccountId::new("a1");
        let deal = Deal {
            id: DealId::new("d1"),
            symbol: Some("XAUUSD".into()),
            kind: "DEAL_TYPE_SELL".into(),
            volume: Some(dec!(0.5)),
            price: Some(dec!(2310.4)),
            profit: Some(dec!(-12.3)),
            time: Utc::now(),
        };
        assert!(repo.record_deal(&account, &deal).await.unwrap());
        assert!(!repo.record_deal(&account, &deal).await.unwrap());
        let stored = repo.deals(&account, 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].profit, Some(dec!(-12.3)));
    }
}
