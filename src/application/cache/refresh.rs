//! The two refresh cycles that keep the cache in step with persistence and
//! the broker.
//!
//! - Structural (slow): groups, approved participants, users, persisted deals
//!   and active freezes are reloaded and swapped in.
//! - Trading (fast): every cached participant's terminal state is pulled and
//!   P&L and drawdown are recomputed.
//!
//! Each cycle is single-flight: a call made while one is running is a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::{ConnectionRegistry, DealOutcome, StateCache};
use crate::adapter::notifier::NotifierRegistry;
use crate::application::DeskSettings;
use crate::domain::{
    Breach, DrawdownPolicy, FreezeRecord, Participant, ParticipantKey, ParticipantStatus, UserId,
    UserProfile,
};
use crate::error::{Error, Result};
use crate::port::{Event, Repository};

/// Summary of a completed structural refresh.
#[derive(Debug, Clone, Default)]
pub struct StructuralRefresh {
    pub groups: usize,
    pub participants: usize,
    /// Active persisted freezes newly surfaced into the frozen map.
    pub surfaced: Vec<FreezeRecord>,
    pub replayed_deals: usize,
}

/// What a trading refresh found for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradingOutcome {
    Healthy,
    /// Drawdown reached the group's threshold.
    Breached(Breach),
    /// Already frozen but holding orders or positions.
    FrozenWithExposure,
    /// Connection or snapshot unavailable this cycle.
    Skipped,
    /// Connection could not be established; dropped from the cache.
    Evicted,
}

/// Summary of a completed trading refresh.
#[derive(Debug, Clone, Default)]
pub struct TradingRefresh {
    pub outcomes: Vec<(ParticipantKey, TradingOutcome)>,
}

impl TradingRefresh {
    /// Participants whose drawdown breached the threshold.
    pub fn breaches(&self) -> impl Iterator<Item = (&ParticipantKey, &Breach)> {
        self.outcomes.iter().filter_map(|(k, o)| match o {
            TradingOutcome::Breached(b) => Some((k, b)),
            _ => None,
        })
    }

    /// Participants dropped because no connection could be established.
    pub fn evicted(&self) -> impl Iterator<Item = &ParticipantKey> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TradingOutcome::Evicted))
            .map(|(k, _)| k)
    }

    /// Frozen participants that still hold exposure.
    pub fn exposed(&self) -> impl Iterator<Item = &ParticipantKey> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TradingOutcome::FrozenWithExposure))
            .map(|(k, _)| k)
    }
}

/// Runs the refresh cycles against the cache.
pub struct Synchronizer {
    cache: Arc<StateCache>,
    repo: Arc<dyn Repository>,
    connections: Arc<ConnectionRegistry>,
    notifier: Arc<NotifierRegistry>,
    settings: Arc<DeskSettings>,
}

impl Synchronizer {
    pub fn new(
        cache: Arc<StateCache>,
        repo: Arc<dyn Repository>,
        connections: Arc<ConnectionRegistry>,
        notifier: Arc<NotifierRegistry>,
        settings: Arc<DeskSettings>,
    ) -> Self {
        Self {
            cache,
            repo,
            connections,
            notifier,
            settings,
        }
    }

    /// Reload structure from the repository and swap it into the cache.
    ///
    /// Returns `Ok(None)` if another structural refresh is running. On error
    /// the previous snapshot is left untouched.
    pub async fn refresh_structural(&self) -> Result<Option<StructuralRefresh>> {
        let Some(_flight) = self.cache.structural_flight.try_enter() else {
            debug!("Structural refresh already running");
            return Ok(None);
        };

        let groups = self.repo.groups().await?;
        let mut latest_active: BTreeMap<ParticipantKey, FreezeRecord> = BTreeMap::new();
        for record in self.repo.active_freezes().await? {
            let key = record.key();
            match latest_active.get(&key) {
                Some(existing) if existing.frozen_at >= record.frozen_at => {}
                _ => {
                    latest_active.insert(key, record);
                }
            }
        }

        let limit = self.settings.deal_history_limit;
        let mut users: HashMap<UserId, UserProfile> = HashMap::new();
        let mut participants = Vec::new();
        for group in &groups {
            for record in self
                .repo
                .participants(&group.id, ParticipantStatus::Approved)
                .await?
            {
                if !users.contains_key(&record.user_id) {
                    if let Some(user) = self.repo.user(&record.user_id).await? {
                        users.insert(record.user_id.clone(), user);
                    }
                }
                let mut participant =
                    Participant::from_record(&record, users.get(&record.user_id), group, limit);
                participant.seed_deals(self.repo.deals(&record.account_id, limit).await?);
                participant.freeze_count = self.repo.freeze_history(&record.key()).await?;
                participants.push(participant);
            }
        }

        let keys: HashSet<ParticipantKey> = participants.iter().map(Participant::key).collect();
        let connects = keys.iter().map(|key| async move {
            if let Err(e) = self.connections.get_or_connect(key).await {
                debug!(account_id = %key.account_id, error = %e, "Connection not ready");
            }
        });
        join_all(connects).await;
        let dropped = self.connections.retain(&keys);

        let summary_groups = groups.len();
        let summary_participants = participants.len();
        let surfaced = self.cache.replace_structure(
            groups,
            participants,
            users.into_values().collect(),
            latest_active.into_values().collect(),
        );

        let mut replayed = 0;
        for (account, deals) in self.cache.drain_pending_known() {
            for deal in deals {
                if matches!(
                    self.cache.add_deal_with(&account, deal, false),
                    DealOutcome::Recorded(_)
                ) {
                    replayed += 1;
                }
            }
        }

        self.cache.mark_structural(Utc::now());
        info!(
            groups = summary_groups,
            participants = summary_participants,
            surfaced = surfaced.len(),
            replayed_deals = replayed,
            dropped_connections = dropped,
            "Structural refresh complete"
        );
        Ok(Some(StructuralRefresh {
            groups: summary_groups,
            participants: summary_participants,
            surfaced,
            replayed_deals: replayed,
        }))
    }

    /// Pull trading data for every cached participant concurrently.
    ///
    /// Returns `None` if another trading refresh is running.
    pub async fn refresh_trading_data(&self) -> Option<TradingRefresh> {
        let Some(_flight) = self.cache.trading_flight.try_enter() else {
            debug!("Trading refresh already running");
            return None;
        };

        let keys = self.cache.keys();
        let updates = keys.into_iter().map(|key| async move {
            let outcome = self.refresh_account(&key).await;
            (key, outcome)
        });
        let outcomes = join_all(updates).await;

        self.cache.mark_trading(Utc::now());
        Some(TradingRefresh { outcomes })
    }

    async fn refresh_account(&self, key: &ParticipantKey) -> TradingOutcome {
        let connection = match self.connections.get_or_connect(key).await {
            Ok(connection) => connection,
            Err(e) => {
                self.evict(key, &e.to_string()).await;
                return TradingOutcome::Evicted;
            }
        };

        let state = match connection.terminal_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(account_id = %key.account_id, group_id = %key.group_id, error = %e, "Trading data unavailable");
                return TradingOutcome::Skipped;
            }
        };

        let Some(adopted) = self.cache.apply_terminal_state(key, &state) else {
            return TradingOutcome::Skipped;
        };
        if let Some(baseline) = adopted {
            if let Err(e) = self
                .repo
                .update_participant_baseline(key, baseline, None)
                .await
            {
                warn!(account_id = %key.account_id, error = %e, "Failed to persist baseline");
            }
        }

        if self.cache.is_frozen(key) {
            return if state.orders.is_empty() && state.positions.is_empty() {
                TradingOutcome::Healthy
            } else {
                TradingOutcome::FrozenWithExposure
            };
        }

        let (Some(group), Some(participant)) = (
            self.cache.group_record(&key.group_id),
            self.cache.participant_in(key),
        ) else {
            return TradingOutcome::Skipped;
        };
        match DrawdownPolicy::evaluate(&group, &participant) {
            Some(breach) => {
                warn!(
                    account_id = %key.account_id,
                    group_id = %key.group_id,
                    drawdown = %breach.drawdown.round_dp(2),
                    threshold = %breach.threshold,
                    "Drawdown threshold breached"
                );
                TradingOutcome::Breached(breach)
            }
            None => TradingOutcome::Healthy,
        }
    }

    /// Announce a failed cycle. The cache keeps its previous snapshot.
    pub fn report_failure(&self, cycle: &'static str, error: &Error) {
        self.notifier.notify_all(Event::RefreshFailed {
            cycle,
            error: error.to_string(),
        });
    }

    /// Drop a participant whose connection cannot be established and record
    /// that on its persisted enrollment.
    async fn evict(&self, key: &ParticipantKey, reason: &str) {
        self.cache.evict(key);
        self.connections.remove(key);
        if let Err(e) = self
            .repo
            .set_participant_status(
                &key.account_id,
                Some(&key.group_id),
                ParticipantStatus::Disconnected,
            )
            .await
        {
            warn!(account_id = %key.account_id, error = %e, "Failed to persist eviction");
        }
        self.notifier.notify_all(Event::ParticipantEvicted {
            key: key.clone(),
            reason: reason.to_string(),
        });
    }
}
