//! Freeze engine: the Active → Frozen → Active lifecycle of a participant.
//!
//! Freezing liquidates the account, persists an active record and schedules
//! a release timer. Release (timer or manual) removes the transient entry,
//! deactivates the persisted records, re-baselines drawdown tracking and
//! refreshes the connection. Persistence and cleanup steps are best effort:
//! their failures are logged and never abort the transition.

mod timers;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

pub use timers::ReleaseTimers;

use crate::adapter::notifier::NotifierRegistry;
use crate::application::cache::{ConnectionRegistry, StateCache};
use crate::application::DeskSettings;
use crate::domain::{FreezeRecord, ParticipantKey, TrackerId};
use crate::error::{Error, Result};
use crate::port::{Event, Repository, TrackerApi, TrackerSpec};

/// Result of a freeze request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeOutcome {
    Frozen(FreezeRecord),
    AlreadyFrozen,
    /// Released by a concurrent unfreeze before the record was persisted.
    /// The record was deactivated and the account was not liquidated.
    Interrupted(FreezeRecord),
}

/// Result of [`FreezeEngine::restore_freeze_timeouts`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Records whose release time had passed and were released.
    pub released: usize,
    /// Records whose timers were re-armed.
    pub rescheduled: usize,
    /// Older duplicate active records that were deactivated.
    pub collapsed: usize,
}

/// Removes a key from the in-progress release set on drop.
struct ReleaseGuard<'a> {
    set: &'a Mutex<HashSet<ParticipantKey>>,
    key: ParticipantKey,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// The freeze engine.
pub struct FreezeEngine {
    cache: Arc<StateCache>,
    repo: Arc<dyn Repository>,
    connections: Arc<ConnectionRegistry>,
    trackers: Arc<dyn TrackerApi>,
    notifier: Arc<NotifierRegistry>,
    settings: Arc<DeskSettings>,
    timers: ReleaseTimers,
    releasing: Mutex<HashSet<ParticipantKey>>,
}

impl FreezeEngine {
    pub fn new(
        cache: Arc<StateCache>,
        repo: Arc<dyn Repository>,
        connections: Arc<ConnectionRegistry>,
        trackers: Arc<dyn TrackerApi>,
        notifier: Arc<NotifierRegistry>,
        settings: Arc<DeskSettings>,
    ) -> Self {
        Self {
            cache,
            repo,
            connections,
            trackers,
            notifier,
            settings,
            timers: ReleaseTimers::new(),
            releasing: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn timers(&self) -> &ReleaseTimers {
        &self.timers
    }

    /// Freeze a participant.
    ///
    /// Idempotent: freezing a frozen participant returns
    /// [`FreezeOutcome::AlreadyFrozen`] and changes nothing.
    ///
    /// # Errors
    /// Returns [`Error::GroupNotFound`] or [`Error::ParticipantNotFound`] if
    /// the group or participant is not cached; nothing is mutated then.
    pub async fn freeze(
        self: &Arc<Self>,
        key: &ParticipantKey,
        reason: &str,
        automated: bool,
    ) -> Result<FreezeOutcome> {
        let group = self
            .cache
            .group_record(&key.group_id)
            .ok_or_else(|| Error::GroupNotFound(key.group_id.to_string()))?;
        let participant = self
            .cache
            .participant_in(key)
            .ok_or_else(|| Error::ParticipantNotFound(key.to_string()))?;

        let duration = group.freeze_duration_or(self.settings.default_freeze_duration);
        let record = FreezeRecord::open(
            key,
            reason,
            automated,
            participant.equity,
            Utc::now(),
            duration,
        );
        if !self.cache.insert_frozen(record.clone()) {
            debug!(account_id = %key.account_id, group_id = %key.group_id, "Already frozen");
            return Ok(FreezeOutcome::AlreadyFrozen);
        }

        self.schedule_release(key.clone(), duration);
        self.cache.bump_freeze_count(key);

        // Deactivate leftovers before inserting so at most one record is active.
        match self.repo.release_freezes(key, record.frozen_at).await {
            Ok(0) => {}
            Ok(n) => warn!(account_id = %key.account_id, stale = n, "Deactivated stale active freezes"),
            Err(e) => warn!(account_id = %key.account_id, error = %e, "Failed to clear stale freezes"),
        }
        if let Err(e) = self.repo.create_freeze(&record).await {
            warn!(account_id = %key.account_id, error = %e, "Failed to persist freeze");
        }
        if self.cache.frozen(key).map(|r| r.id) != Some(record.id.clone()) {
            if let Err(e) = self.repo.deactivate_freeze(&record.id, Utc::now()).await {
                warn!(freeze_id = %record.id, error = %e, "Failed to deactivate interrupted freeze");
            }
            debug!(account_id = %key.account_id, "Freeze released while persisting");
            return Ok(FreezeOutcome::Interrupted(record));
        }

        self.liquidate(key).await;
        self.notifier
            .notify_all(Event::AccountFrozen(record.clone()));
        Ok(FreezeOutcome::Frozen(record))
    }

    fn schedule_release(self: &Arc<Self>, key: ParticipantKey, delay: Duration) {
        let engine = Arc::downgrade(self);
        let fired = key.clone();
        self.timers.schedule(key, delay, move |generation| async move {
            if let Some(engine) = engine.upgrade() {
                engine.release_from_timer(&fired, generation).await;
            }
        });
    }

    async fn release_from_timer(&self, key: &ParticipantKey, generation: u64) {
        if !self.timers.claim(key, generation) {
            debug!(account_id = %key.account_id, generation, "Stale release timer ignored");
            return;
        }
        if let Err(e) = self.release(key, true).await {
            warn!(account_id = %key.account_id, error = %e, "Automatic release failed");
        }
    }

    /// Manually unfreeze a participant, cancelling its pending timer.
    ///
    /// Returns `false` if the participant was not frozen.
    pub async fn unfreeze(&self, key: &ParticipantKey) -> Result<bool> {
        self.timers.cancel(key);
        self.release(key, false).await
    }

    /// Release every frozen participant, including active persisted records
    /// that have no transient entry. Returns how many were released.
    pub async fn unfreeze_all(&self) -> Result<usize> {
        let mut keys: HashSet<ParticipantKey> = self.cache.frozen_keys().into_iter().collect();
        keys.extend(
            self.repo
                .active_freezes()
                .await?
                .into_iter()
                .map(|r| r.key()),
        );
        let mut released = 0;
        for key in keys {
            if self.unfreeze(&key).await? {
                released += 1;
            }
        }
        info!(released, "Released all frozen accounts");
        Ok(released)
    }

    async fn release(&self, key: &ParticipantKey, automatic: bool) -> Result<bool> {
        if !self.releasing.lock().insert(key.clone()) {
            debug!(account_id = %key.account_id, "Release already in progress");
            return Ok(false);
        }
        let _guard = ReleaseGuard {
            set: &self.releasing,
            key: key.clone(),
        };

        let now = Utc::now();
        let had_entry = self.cache.release_frozen(key, now).is_some();
        let persisted = match self.repo.release_freezes(key, now).await {
            Ok(n) => n,
            Err(e) => {
                warn!(account_id = %key.account_id, error = %e, "Failed to persist release");
                0
            }
        };
        if !had_entry && persisted == 0 {
            return Ok(false);
        }

        let baseline = self.rebaseline(key).await;
        self.connections.ensure_fresh(key).await;
        info!(
            account_id = %key.account_id,
            group_id = %key.group_id,
            automatic,
            "Account unfrozen"
        );
        self.notifier.notify_all(Event::AccountReleased {
            key: key.clone(),
            baseline: baseline.unwrap_or_default(),
            automatic,
        });
        Ok(true)
    }

    /// Reset drawdown tracking to current equity and replace the tracker.
    async fn rebaseline(&self, key: &ParticipantKey) -> Option<Decimal> {
        let baseline = self.cache.rebaseline(key)?;
        let previous = self.cache.participant_in(key).and_then(|p| p.tracker_id);
        let tracker = self.replace_tracker(key, previous.as_ref()).await;
        if tracker.is_some() {
            self.cache.set_tracker(key, tracker.clone());
        }
        if let Err(e) = self
            .repo
            .update_participant_baseline(key, baseline, tracker.as_ref())
            .await
        {
            warn!(account_id = %key.account_id, error = %e, "Failed to persist baseline");
        }
        Some(baseline)
    }

    async fn replace_tracker(
        &self,
        key: &ParticipantKey,
        previous: Option<&TrackerId>,
    ) -> Option<TrackerId> {
        if let Some(old) = previous {
            if let Err(e) = self.trackers.remove_tracker(&key.account_id, old).await {
                warn!(account_id = %key.account_id, tracker_id = %old, error = %e, "Failed to remove tracker");
            }
        }
        let group = self.cache.group_record(&key.group_id)?;
        if !group.freezing_enabled() {
            return None;
        }
        let spec = TrackerSpec {
            name: key.tracker_name(),
            threshold_percent: group.freeze_threshold,
            period: self.settings.tracker_period,
        };
        match self.trackers.create_tracker(&key.account_id, &spec).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(account_id = %key.account_id, error = %e, "Failed to create tracker");
                None
            }
        }
    }

    /// Cancel orders then close positions. Failures are logged per item.
    async fn liquidate(&self, key: &ParticipantKey) {
        let connection = match self.connections.get_or_connect(key).await {
            Ok(c) => c,
            Err(e) => {
                warn!(account_id = %key.account_id, error = %e, "Cannot liquidate: no connection");
                return;
            }
        };
        let (orders, positions) = match connection.terminal_state().await {
            Ok(state) => (state.orders, state.positions),
            Err(e) => {
                debug!(account_id = %key.account_id, error = %e, "Using cached exposure");
                self.cache
                    .participant_in(key)
                    .map(|p| (p.orders, p.positions))
                    .unwrap_or_default()
            }
        };

        let cancels = orders.iter().map(|o| connection.cancel_order(&o.id));
        let cancel_failures = join_all(cancels)
            .await
            .into_iter()
            .filter(Result::is_err)
            .count();
        let closes = positions.iter().map(|p| connection.close_position(&p.id));
        let close_failures = join_all(closes)
            .await
            .into_iter()
            .filter(Result::is_err)
            .count();

        if cancel_failures + close_failures > 0 {
            warn!(
                account_id = %key.account_id,
                cancel_failures,
                close_failures,
                "Liquidation incomplete"
            );
        } else {
            info!(
                account_id = %key.account_id,
                orders = orders.len(),
                positions = positions.len(),
                "Account liquidated"
            );
        }
    }

    /// Liquidate a frozen participant again if enforcement is enabled.
    pub async fn enforce(&self, key: &ParticipantKey) {
        if self.settings.enforce_while_frozen && self.cache.is_frozen(key) {
            self.liquidate(key).await;
        }
    }

    /// Re-arm timers from persisted freezes after a restart.
    ///
    /// Elapsed records are released at once; pending ones are put back into
    /// the frozen map with a timer for the remaining delay. When several
    /// records are active for one participant only the latest is kept.
    pub async fn restore_freeze_timeouts(self: &Arc<Self>) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        let mut latest: BTreeMap<ParticipantKey, FreezeRecord> = BTreeMap::new();
        let now = Utc::now();

        for record in self.repo.active_freezes().await? {
            let key = record.key();
            let superseded = match latest.get(&key) {
                Some(current) if current.frozen_at >= record.frozen_at => Some(record),
                _ => latest.insert(key, record),
            };
            if let Some(old) = superseded {
                if let Err(e) = self.repo.deactivate_freeze(&old.id, now).await {
                    warn!(freeze_id = %old.id, error = %e, "Failed to deactivate duplicate freeze");
                }
                report.collapsed += 1;
            }
        }

        for (key, record) in latest {
            match record.remaining(now) {
                None => {
                    self.cache.insert_frozen(record);
                    if self.release(&key, true).await? {
                        report.released += 1;
                    }
                }
                Some(delay) => {
                    self.cache.insert_frozen(record);
                    if !self.timers.is_pending(&key) {
                        self.schedule_release(key, delay);
                    }
                    report.rescheduled += 1;
                }
            }
        }
        info!(
            released = report.released,
            rescheduled = report.rescheduled,
            collapsed = report.collapsed,
            "Freeze timers restored"
        );
        Ok(report)
    }

    /// Take over freezes surfaced by a structural refresh.
    pub async fn adopt(self: &Arc<Self>, records: Vec<FreezeRecord>) {
        let now = Utc::now();
        for record in records {
            let key = record.key();
            if self.releasing.lock().contains(&key) {
                self.cache.take_frozen(&key);
                continue;
            }
            if self.timers.is_pending(&key) {
                continue;
            }
            match record.remaining(now) {
                Some(delay) => {
                    debug!(account_id = %key.account_id, "Adopted persisted freeze");
                    self.schedule_release(key, delay);
                }
                None => {
                    if let Err(e) = self.release(&key, true).await {
                        warn!(account_id = %key.account_id, error = %e, "Release of adopted freeze failed");
                    }
                }
            }
        }
    }

    /// Drop all freeze state of a participant that is leaving.
    pub async fn discard(&self, key: &ParticipantKey) {
        let now = Utc::now();
        self.timers.cancel(key);
        self.cache.release_frozen(key, now);
        if let Err(e) = self.repo.release_freezes(key, now).await {
            warn!(account_id = %key.account_id, error = %e, "Failed to release freezes of removed participant");
        }
    }

    /// Stop tracking the freeze of an evicted participant. The persisted
    /// record stays active and is adopted again once the participant is
    /// reloaded.
    pub fn forget(&self, key: &ParticipantKey) {
        if self.timers.cancel(key) {
            debug!(account_id = %key.account_id, "Release timer dropped on eviction");
        }
        self.cache.take_frozen(key);
    }

    /// Cancel every pending timer.
    pub fn shutdown(&self) -> usize {
        self.timers.cancel_all()
    }
}
