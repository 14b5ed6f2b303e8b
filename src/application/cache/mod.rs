//! In-memory mirror of groups, participants and frozen accounts.
//!
//! Participants are keyed by `(GroupId, AccountId)`; group views are
//! computed at read time. All maps sit behind short `parking_lot` critical
//! sections that are never held across an `.await`. When more than one lock
//! is taken the order is groups, participants, frozen, released.
//!
//! Reads return owned snapshots.

mod connections;
mod refresh;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{
    rank, AccountId, AccountInformation, Deal, FreezeRecord, Group, GroupId, LeaderboardEntry,
    Order, OrderId, Participant, ParticipantKey, Position, PositionId, TerminalState, TrackerId,
    UserId, UserProfile,
};

pub use connections::ConnectionRegistry;
pub use refresh::{StructuralRefresh, Synchronizer, TradingOutcome, TradingRefresh};

/// A group together with its current participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    #[serde(flatten)]
    pub group: Group,
    pub participants: Vec<Participant>,
}

/// Result of [`StateCache::add_deal_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DealOutcome {
    /// Appended to these participants' histories.
    Recorded(Vec<ParticipantKey>),
    /// Every participant of the account already had this deal.
    Duplicate,
    /// The account is unknown; the deal waits for the next structural refresh.
    Queued,
    /// The account is unknown and queueing was not requested.
    Dropped,
}

/// Guard that lets only one caller into a refresh cycle at a time.
#[derive(Debug, Default)]
pub struct SingleFlight(AtomicBool);

impl SingleFlight {
    /// Enter the flight, or `None` if another caller is inside.
    pub fn try_enter(&self) -> Option<FlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.0))
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases a [`SingleFlight`] on drop.
pub struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The state cache.
#[derive(Debug)]
pub struct StateCache {
    groups: RwLock<BTreeMap<GroupId, Group>>,
    participants: RwLock<BTreeMap<ParticipantKey, Participant>>,
    frozen: RwLock<BTreeMap<ParticipantKey, FreezeRecord>>,
    /// Last release time per participant.
    released: RwLock<HashMap<ParticipantKey, DateTime<Utc>>>,
    users: RwLock<HashMap<UserId, UserProfile>>,
    pending_deals: Mutex<HashMap<AccountId, Vec<Deal>>>,
    last_structural: RwLock<Option<DateTime<Utc>>>,
    last_trading: RwLock<Option<DateTime<Utc>>>,
    pub(crate) structural_flight: SingleFlight,
    pub(crate) trading_flight: SingleFlight,
    queue_unknown_deals: bool,
}

impl StateCache {
    #[must_use]
    pub fn new(queue_unknown_deals: bool) -> Self {
        Self {
            groups: RwLock::new(BTreeMap::new()),
            participants: RwLock::new(BTreeMap::new()),
            frozen: RwLock::new(BTreeMap::new()),
            released: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            pending_deals: Mutex::new(HashMap::new()),
            last_structural: RwLock::new(None),
            last_trading: RwLock::new(None),
            structural_flight: SingleFlight::default(),
            trading_flight: SingleFlight::default(),
            queue_unknown_deals,
        }
    }

    // --- reads -------------------------------------------------------------

    /// First cached participant for `account`, in group order.
    #[must_use]
    pub fn participant(&self, account: &AccountId) -> Option<Participant> {
        self.participants
            .read()
            .values()
            .find(|p| &p.account_id == account)
            .cloned()
    }

    #[must_use]
    pub fn participant_in(&self, key: &ParticipantKey) -> Option<Participant> {
        self.participants.read().get(key).cloned()
    }

    /// Keys of every group membership of `account`.
    #[must_use]
    pub fn keys_of(&self, account: &AccountId) -> Vec<ParticipantKey> {
        self.participants
            .read()
            .keys()
            .filter(|k| &k.account_id == account)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<ParticipantKey> {
        self.participants.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        self.groups.read().values().cloned().collect()
    }

    #[must_use]
    pub fn group_record(&self, id: &GroupId) -> Option<Group> {
        self.groups.read().get(id).cloned()
    }

    #[must_use]
    pub fn group(&self, id: &GroupId) -> Option<GroupView> {
        let group = self.group_record(id)?;
        Some(GroupView {
            participants: self.group_participants(id),
            group,
        })
    }

    /// Participants of one group in enrollment order.
    #[must_use]
    pub fn group_participants(&self, id: &GroupId) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .participants
            .read()
            .values()
            .filter(|p| &p.group_id == id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.joined_at);
        participants
    }

    /// Currently frozen accounts as `{groupId: {accountId: record}}`.
    #[must_use]
    pub fn frozen_accounts(&self) -> BTreeMap<GroupId, BTreeMap<AccountId, FreezeRecord>> {
        let mut out: BTreeMap<GroupId, BTreeMap<AccountId, FreezeRecord>> = BTreeMap::new();
        for (key, record) in self.frozen.read().iter() {
            out.entry(key.group_id.clone())
                .or_default()
                .insert(key.account_id.clone(), record.clone());
        }
        out
    }

    #[must_use]
    pub fn frozen(&self, key: &ParticipantKey) -> Option<FreezeRecord> {
        self.frozen.read().get(key).cloned()
    }

    #[must_use]
    pub fn is_frozen(&self, key: &ParticipantKey) -> bool {
        self.frozen.read().contains_key(key)
    }

    #[must_use]
    pub fn frozen_keys(&self) -> Vec<ParticipantKey> {
        self.frozen.read().keys().cloned().collect()
    }

    /// Ranked leaderboard of a group. Unknown or empty groups yield an empty list.
    #[must_use]
    pub fn leaderboard(&self, id: &GroupId) -> Vec<LeaderboardEntry> {
        let Some(group) = self.group_record(id) else {
            return Vec::new();
        };
        let participants = self.group_participants(id);
        let frozen: BTreeMap<AccountId, FreezeRecord> = self
            .frozen
            .read()
            .iter()
            .filter(|(k, _)| &k.group_id == id)
            .map(|(k, r)| (k.account_id.clone(), r.clone()))
            .collect();
        rank(&group, &participants, &frozen)
    }

    #[must_use]
    pub fn user(&self, id: &UserId) -> Option<UserProfile> {
        self.users.read().get(id).cloned()
    }

    #[must_use]
    pub fn pending_deal_count(&self) -> usize {
        self.pending_deals.lock().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn last_structural_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_structural.read()
    }

    #[must_use]
    pub fn last_trading_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_trading.read()
    }

    // --- point mutations ---------------------------------------------------

    /// Apply `f` to every participant of `account`. Returns how many matched.
    fn for_account(&self, account: &AccountId, mut f: impl FnMut(&mut Participant)) -> usize {
        let mut participants = self.participants.write();
        let mut matched = 0;
        for p in participants.values_mut().filter(|p| &p.account_id == account) {
            f(p);
            matched += 1;
        }
        matched
    }

    /// Replace the position snapshot of every participant of `account`.
    pub fn set_positions(&self, account: &AccountId, positions: Vec<Position>) -> bool {
        self.for_account(account, |p| p.positions.clone_from(&positions)) > 0
    }

    /// Replace the order snapshot of every participant of `account`.
    pub fn set_orders(&self, account: &AccountId, orders: Vec<Order>) -> bool {
        self.for_account(account, |p| p.orders.clone_from(&orders)) > 0
    }

    pub fn upsert_position(&self, account: &AccountId, position: &Position) -> bool {
        self.for_account(account, |p| {
            match p.positions.iter_mut().find(|x| x.id == position.id) {
                Some(existing) => *existing = position.clone(),
                None => p.positions.push(position.clone()),
            }
        }) > 0
    }

    pub fn remove_position(&self, account: &AccountId, id: &PositionId) -> bool {
        self.for_account(account, |p| p.positions.retain(|x| &x.id != id)) > 0
    }

    pub fn upsert_order(&self, account: &AccountId, order: &Order) -> bool {
        self.for_account(account, |p| match p.orders.iter_mut().find(|x| x.id == order.id) {
            Some(existing) => *existing = order.clone(),
            None => p.orders.push(order.clone()),
        }) > 0
    }

    pub fn remove_order(&self, account: &AccountId, id: &OrderId) -> bool {
        self.for_account(account, |p| p.orders.retain(|x| &x.id != id)) > 0
    }

    /// Store balance and equity for every participant of `account`.
    ///
    /// Returns the baselines established by this update, to be persisted.
    pub fn apply_account_information(
        &self,
        account: &AccountId,
        info: &AccountInformation,
    ) -> Vec<(ParticipantKey, Decimal)> {
        let mut adopted = Vec::new();
        self.for_account(account, |p| {
            if p.apply_account_information(info) {
                adopted.push((p.key(), p.initial_balance));
            }
        });
        adopted
    }

    /// Apply a terminal snapshot to one participant.
    ///
    /// Returns `None` if the participant is not cached, otherwise the
    /// baseline if this update established it.
    pub fn apply_terminal_state(
        &self,
        key: &ParticipantKey,
        state: &TerminalState,
    ) -> Option<Option<Decimal>> {
        let mut participants = self.participants.write();
        let p = participants.get_mut(key)?;
        let adopted = p.apply_terminal_state(state);
        Some(adopted.then_some(p.initial_balance))
    }

    /// Record a deal using the configured queueing policy.
    pub fn add_deal(&self, account: &AccountId, deal: Deal) -> DealOutcome {
        self.add_deal_with(account, deal, self.queue_unknown_deals)
    }

    /// Record a deal for every participant of `account`.
    ///
    /// Deals for unknown accounts are queued when `queue` is set and replayed
    /// by the next structural refresh. Queued deals are deduplicated by id.
    pub fn add_deal_with(&self, account: &AccountId, deal: Deal, queue: bool) -> DealOutcome {
        let mut recorded = Vec::new();
        let matched = self.for_account(account, |p| {
            if p.record_deal(deal.clone()) {
                recorded.push(p.key());
            }
        });
        if matched > 0 {
            return if recorded.is_empty() {
                DealOutcome::Duplicate
            } else {
                DealOutcome::Recorded(recorded)
            };
        }
        if !queue {
            return DealOutcome::Dropped;
        }
        let mut pending = self.pending_deals.lock();
        let queued = pending.entry(account.clone()).or_default();
        if !queued.iter().any(|d| d.id == deal.id) {
            queued.push(deal);
        }
        DealOutcome::Queued
    }

    /// Take queued deals of accounts that are now cached.
    pub(crate) fn drain_pending_known(&self) -> Vec<(AccountId, Vec<Deal>)> {
        let known: Vec<AccountId> = {
            let participants = self.participants.read();
            let pending = self.pending_deals.lock();
            pending
                .keys()
                .filter(|a| participants.keys().any(|k| &k.account_id == *a))
                .cloned()
                .collect()
        };
        let mut pending = self.pending_deals.lock();
        known
            .into_iter()
            .filter_map(|a| pending.remove(&a).map(|deals| (a, deals)))
            .collect()
    }

    /// Remove every group membership of `account`. Returns the removed keys.
    pub fn remove_participant(&self, account: &AccountId) -> Vec<ParticipantKey> {
        let mut participants = self.participants.write();
        let keys: Vec<_> = participants
            .keys()
            .filter(|k| &k.account_id == account)
            .cloned()
            .collect();
        for key in &keys {
            participants.remove(key);
        }
        self.pending_deals.lock().remove(account);
        keys
    }

    /// Drop one participant from the cache together with its transient
    /// freeze entry. Persisted freezes are untouched and surface again once
    /// the participant is reloaded.
    pub fn evict(&self, key: &ParticipantKey) -> Option<Participant> {
        let mut participants = self.participants.write();
        self.frozen.write().remove(key);
        participants.remove(key)
    }

    // --- freeze bookkeeping --------------------------------------------------

    /// Insert a transient freeze entry. Returns `false` if one already exists.
    pub fn insert_frozen(&self, record: FreezeRecord) -> bool {
        let mut frozen = self.frozen.write();
        let key = record.key();
        if frozen.contains_key(&key) {
            return false;
        }
        frozen.insert(key, record);
        true
    }

    pub fn take_frozen(&self, key: &ParticipantKey) -> Option<FreezeRecord> {
        self.frozen.write().remove(key)
    }

    /// Remove the transient entry and stamp the release time.
    ///
    /// Persisted records frozen at or before the stamp are not surfaced by a
    /// later structural swap, even if that swap loaded them before the
    /// release was persisted.
    pub fn release_frozen(
        &self,
        key: &ParticipantKey,
        at: DateTime<Utc>,
    ) -> Option<FreezeRecord> {
        let mut frozen = self.frozen.write();
        let mut released = self.released.write();
        let stamp = released.entry(key.clone()).or_insert(at);
        if *stamp < at {
            *stamp = at;
        }
        frozen.remove(key)
    }

    #[must_use]
    pub fn last_release(&self, key: &ParticipantKey) -> Option<DateTime<Utc>> {
        self.released.read().get(key).copied()
    }

    pub fn bump_freeze_count(&self, key: &ParticipantKey) {
        if let Some(p) = self.participants.write().get_mut(key) {
            p.freeze_count = p.freeze_count.saturating_add(1);
        }
    }

    /// Reset a participant's drawdown baseline to its current equity.
    pub fn rebaseline(&self, key: &ParticipantKey) -> Option<Decimal> {
        self.participants.write().get_mut(key).map(Participant::rebaseline)
    }

    pub fn set_tracker(&self, key: &ParticipantKey, tracker: Option<TrackerId>) {
        if let Some(p) = self.participants.write().get_mut(key) {
            p.tracker_id = tracker;
        }
    }

    // --- structural swap -----------------------------------------------------

    /// Swap in a freshly loaded structure.
    ///
    /// Fast-path fields of participants that survive the swap are merged
    /// from the previous view under the write lock, so updates that landed
    /// while the refresh was loading are kept. Active persisted freezes of
    /// cached participants with no transient entry, and frozen after the
    /// participant's last release, are surfaced into the frozen map and
    /// returned.
    pub(crate) fn replace_structure(
        &self,
        groups: Vec<Group>,
        participants: Vec<Participant>,
        users: Vec<UserProfile>,
        active: Vec<FreezeRecord>,
    ) -> Vec<FreezeRecord> {
        let mut group_map = self.groups.write();
        let mut participant_map = self.participants.write();
        let mut frozen = self.frozen.write();
        let released = self.released.read();

        let mut next = BTreeMap::new();
        for mut p in participants {
            let key = p.key();
            if let Some(previous) = participant_map.get(&key) {
                p.merge_fast_path(previous);
                p.freeze_count = p.freeze_count.max(previous.freeze_count);
            }
            next.insert(key, p);
        }

        *group_map = groups.into_iter().map(|g| (g.id.clone(), g)).collect();
        *participant_map = next;

        let mut surfaced = Vec::new();
        for record in active {
            let key = record.key();
            let stale = released
                .get(&key)
                .is_some_and(|at| record.frozen_at <= *at);
            if !stale && participant_map.contains_key(&key) && !frozen.contains_key(&key) {
                frozen.insert(key, record.clone());
                surfaced.push(record);
            }
        }
        drop(released);
        drop(frozen);
        drop(participant_map);
        drop(group_map);

        let mut user_map = self.users.write();
        *user_map = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        surfaced
    }

    pub(crate) fn mark_structural(&self, at: DateTime<Utc>) {
        *self.last_structural.write() = Some(at);
    }

    pub(crate) fn mark_trading(&self, at: DateTime<Utc>) {
        *self.last_trading.write() = Some(at);
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new(true)
    }
}
