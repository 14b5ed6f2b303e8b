//! In-memory repository for tests and the `memory` database backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::domain::{
    AccountId, Deal, FreezeId, FreezeRecord, Group, GroupId, ParticipantKey, ParticipantRecord,
    ParticipantStatus, TrackerId, UserId, UserProfile,
};
use crate::error::{Error, Result};
use crate::port::Repository;

/// In-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    groups: RwLock<BTreeMap<GroupId, Group>>,
    participants: RwLock<BTreeMap<ParticipantKey, ParticipantRecord>>,
    users: RwLock<HashMap<UserId, UserProfile>>,
    deals: RwLock<HashMap<AccountId, Vec<Deal>>>,
    freezes: RwLock<Vec<FreezeRecord>>,
    release_writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every freeze record, active or not, in insertion order.
    #[must_use]
    pub fn all_freezes(&self) -> Vec<FreezeRecord> {
        self.freezes.read().clone()
    }

    /// Number of `release_freezes` calls that released at least one record.
    #[must_use]
    pub fn release_writes(&self) -> usize {
        self.release_writes.load(Ordering::SeqCst)
    }

    /// Participant record by key, regardless of status.
    #[must_use]
    pub fn participant_record(&self, key: &ParticipantKey) -> Option<ParticipantRecord> {
        self.participants.read().get(key).cloned()
    }

    /// Make every write fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn groups(&self) -> Result<Vec<Group>> {
        Ok(self.groups.read().values().cloned().collect())
    }

    async fn group(&self, id: &GroupId) -> Result<Option<Group>> {
        Ok(self.groups.read().get(id).cloned())
    }

    async fn participants(
        &self,
        group: &GroupId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>> {
        let mut records: Vec<ParticipantRecord> = self
            .participants
            .read()
            .values()
            .filter(|p| &p.group_id == group && p.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|p| p.joined_at);
        Ok(records)
    }

    async fn set_participant_status(
        &self,
        account: &AccountId,
        group: Option<&GroupId>,
        status: ParticipantStatus,
    ) -> Result<usize> {
        self.check_writable()?;
        let mut participants = self.participants.write();
        let mut updated = 0;
        for record in participants.values_mut() {
            if &record.account_id == account && group.map_or(true, |g| &record.group_id == g) {
                record.status = status;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn update_participant_baseline(
        &self,
        key: &ParticipantKey,
        baseline: Decimal,
        tracker: Option<&TrackerId>,
    ) -> Result<()> {
        self.check_writable()?;
        let mut participants = self.participants.write();
        let record = participants
            .get_mut(key)
            .ok_or_else(|| Error::ParticipantNotFound(key.to_string()))?;
        record.initial_balance = Some(baseline);
        if let Some(tracker) = tracker {
            record.tracker_id = Some(tracker.clone());
        }
        Ok(())
    }

    async fn user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn deals(&self, account: &AccountId, limit: usize) -> Result<Vec<Deal>> {
        let deals = self.deals.read();
        let Some(list) = deals.get(account) else {
            return Ok(Vec::new());
        };
        let mut sorted = list.clone();
        sorted.sort_by_key(|d| d.time);
        let skip = sorted.len().saturating_sub(limit);
        Ok(sorted.into_iter().skip(skip).collect())
    }

    async fn record_deal(&self, account: &AccountId, deal: &Deal) -> Result<bool> {
        self.check_writable()?;
        let mut deals = self.deals.write();
        let list = deals.entry(account.clone()).or_default();
        if list.iter().any(|d| d.id == deal.id) {
            return Ok(false);
        }
        list.push(deal.clone());
        Ok(true)
    }

    async fn create_freeze(&self, record: &FreezeRecord) -> Result<()> {
        self.check_writable()?;
        self.freezes.write().push(record.clone());
        Ok(())
    }

    async fn active_freezes(&self) -> Result<Vec<FreezeRecord>> {
        let mut active: Vec<_> = self
            .freezes
            .read()
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect();
        active.sort_by_key(|r| r.frozen_at);
        Ok(active)
    }

    async fn freeze_history(&self, key: &ParticipantKey) -> Result<u32> {
        let count = self
            .freezes
            .read()
            .iter()
            .filter(|r| r.account_id == key.account_id && r.group_id == key.group_id)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn release_freezes(&self, key: &ParticipantKey, at: DateTime<Utc>) -> Result<usize> {
        self.check_writable()?;
        let mut released = 0;
        for record in self.freezes.write().iter_mut() {
            if record.active && record.account_id == key.account_id && record.group_id == key.group_id
            {
                record.release(at);
                released += 1;
            }
        }
        if released > 0 {
            self.release_writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(released)
    }

    async fn deactivate_freeze(&self, id: &FreezeId, at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        if let Some(record) = self.freezes.write().iter_mut().find(|r| &r.id == id) {
            record.release(at);
        }
        Ok(())
    }

    async fn save_group(&self, group: &Group) -> Result<()> {
        self.check_writable()?;
        self.groups.write().insert(group.id.clone(), group.clone());
        Ok(())
    }

    async fn save_participant(&self, record: &ParticipantRecord) -> Result<()> {
        self.check_writable()?;
        self.participants
            .write()
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn save_user(&self, user: &UserProfile) -> Result<()> {
        self.check_writable()?;
        self.users.write().insert(user.id.clone(), user.clone());
        Ok(())
    }
}
