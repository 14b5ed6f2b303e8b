//! The risk desk: one explicitly constructed service that owns the cache,
//! the freeze engine and the refresh loops.
//!
//! Lifecycle is `Desk::new` → [`Desk::start`] → [`DeskHandle::shutdown`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::cache::{
    ConnectionRegistry, GroupView, StateCache, StructuralRefresh, Synchronizer, TradingRefresh,
};
use super::freeze::{FreezeEngine, FreezeOutcome};
use super::listener::{AccountListener, ListenerHub, ReactionRunner};
use super::DeskSettings;
use crate::adapter::notifier::NotifierRegistry;
use crate::domain::{
    AccountEvent, AccountId, FreezeRecord, GroupId, LeaderboardEntry, LeaderboardSnapshot,
    Participant, ParticipantKey, ParticipantStatus, UserId, UserProfile, DRAWDOWN_REASON,
};
use crate::error::{Error, Result};
use crate::port::{AccountGateway, EventSink, Repository, TrackerApi};

/// The risk desk service.
pub struct Desk {
    cache: Arc<StateCache>,
    repo: Arc<dyn Repository>,
    connections: Arc<ConnectionRegistry>,
    trackers: Arc<dyn TrackerApi>,
    engine: Arc<FreezeEngine>,
    sync: Synchronizer,
    listener: AccountListener,
    runner: ReactionRunner,
    settings: Arc<DeskSettings>,
    sink: EventSink,
    events: Mutex<Option<mpsc::Receiver<AccountEvent>>>,
}

impl Desk {
    pub fn new(
        repo: Arc<dyn Repository>,
        gateway: Arc<dyn AccountGateway>,
        trackers: Arc<dyn TrackerApi>,
        notifier: NotifierRegistry,
        settings: DeskSettings,
    ) -> Arc<Self> {
        let settings = Arc::new(settings);
        let notifier = Arc::new(notifier);
        let (sink, events) = mpsc::channel(settings.event_buffer.max(1));

        let cache = Arc::new(StateCache::new(settings.queue_unknown_deals));
        let connections = Arc::new(ConnectionRegistry::new(gateway, sink.clone()));
        let engine = Arc::new(FreezeEngine::new(
            Arc::clone(&cache),
            Arc::clone(&repo),
            Arc::clone(&connections),
            Arc::clone(&trackers),
            Arc::clone(&notifier),
            Arc::clone(&settings),
        ));
        let sync = Synchronizer::new(
            Arc::clone(&cache),
            Arc::clone(&repo),
            Arc::clone(&connections),
            notifier,
            Arc::clone(&settings),
        );
        let listener = AccountListener::new(Arc::clone(&cache));
        let runner = ReactionRunner::new(Arc::clone(&engine), Arc::clone(&repo));

        Arc::new(Self {
            cache,
            repo,
            connections,
            trackers,
            engine,
            sync,
            listener,
            runner,
            settings,
            sink,
            events: Mutex::new(Some(events)),
        })
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<FreezeEngine> {
        &self.engine
    }

    #[must_use]
    pub fn settings(&self) -> &DeskSettings {
        &self.settings
    }

    /// Sender that gateways and trackers push events into.
    #[must_use]
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Apply one event and run its reaction to completion.
    pub async fn ingest(&self, event: AccountEvent) {
        if let Some(reaction) = self.listener.apply(event) {
            self.runner.run(reaction).await;
        }
    }

    /// Decode a raw JSON event and ingest it.
    ///
    /// # Errors
    /// Returns [`Error::Gateway`] for payloads that do not decode; nothing
    /// is applied then.
    pub async fn ingest_raw(&self, raw: &str) -> Result<()> {
        let event = AccountEvent::decode(raw).map_err(|e| {
            warn!(error = %e, "Rejected malformed event");
            e
        })?;
        self.ingest(event).await;
        Ok(())
    }

    /// Restore persisted state and start the refresh loops and the event
    /// listener.
    ///
    /// # Errors
    /// Fails if the desk was already started, or if the initial load or
    /// freeze restore cannot read the repository.
    pub async fn start(self: &Arc<Self>) -> Result<DeskHandle> {
        let events = self
            .events
            .lock()
            .take()
            .ok_or_else(|| Error::Lifecycle("desk already started".into()))?;

        // Surfaced records are handled by the restore below, which runs after
        // the first trading pull so releases re-baseline on live equity.
        self.sync.refresh_structural().await?;
        self.refresh_trading_data().await;
        self.engine.restore_freeze_timeouts().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(3);

        let desk = Arc::clone(self);
        tasks.push(spawn_loop(
            "structural",
            self.settings.structural_refresh,
            shutdown_rx.clone(),
            move || {
                let desk = Arc::clone(&desk);
                async move {
                    if let Err(e) = desk.refresh_structural().await {
                        error!(error = %e, "Structural refresh failed");
                        desk.sync.report_failure("structural", &e);
                    }
                }
            },
        ));

        let desk = Arc::clone(self);
        tasks.push(spawn_loop(
            "trading",
            self.settings.trading_refresh,
            shutdown_rx.clone(),
            move || {
                let desk = Arc::clone(&desk);
                async move {
                    desk.refresh_trading_data().await;
                }
            },
        ));

        let hub = ListenerHub::new(
            AccountListener::new(Arc::clone(&self.cache)),
            self.runner.clone(),
        );
        tasks.push(tokio::spawn(hub.run(events, shutdown_rx)));

        info!(
            structural = ?self.settings.structural_refresh,
            trading = ?self.settings.trading_refresh,
            "Risk desk started"
        );
        Ok(DeskHandle {
            shutdown: shutdown_tx,
            tasks,
            engine: Arc::clone(&self.engine),
        })
    }

    /// Run a structural refresh and take over any freezes it surfaced.
    pub async fn refresh_structural(&self) -> Result<Option<StructuralRefresh>> {
        let refresh = self.sync.refresh_structural().await?;
        if let Some(r) = &refresh {
            if !r.surfaced.is_empty() {
                self.engine.adopt(r.surfaced.clone()).await;
            }
        }
        Ok(refresh)
    }

    /// Run a trading refresh, freezing breached participants and enforcing
    /// frozen ones that still hold exposure.
    pub async fn refresh_trading_data(&self) -> Option<TradingRefresh> {
        let refresh = self.sync.refresh_trading_data().await?;
        for key in refresh.evicted() {
            self.engine.forget(key);
        }
        for (key, breach) in refresh.breaches() {
            debug!(account_id = %key.account_id, drawdown = %breach.drawdown, "Freezing on breach");
            if let Err(e) = self.engine.freeze(key, DRAWDOWN_REASON, true).await {
                warn!(account_id = %key.account_id, group_id = %key.group_id, error = %e, "Freeze failed");
            }
        }
        for key in refresh.exposed() {
            self.engine.enforce(key).await;
        }
        Some(refresh)
    }

    // --- exposed operations --------------------------------------------------

    #[must_use]
    pub fn leaderboard(&self, group: &GroupId) -> Vec<LeaderboardEntry> {
        self.cache.leaderboard(group)
    }

    /// Leaderboard stamped with the projection time and the last trading
    /// refresh.
    #[must_use]
    pub fn snapshot(&self, group: &GroupId) -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            timestamp: Utc::now(),
            last_trading_refresh: self.cache.last_trading_refresh(),
            leaderboard: self.cache.leaderboard(group),
        }
    }

    /// Manually freeze a participant.
    pub async fn freeze(
        &self,
        group: &GroupId,
        account: &AccountId,
        reason: &str,
    ) -> Result<FreezeOutcome> {
        let key = ParticipantKey::new(group.clone(), account.clone());
        self.engine.freeze(&key, reason, false).await
    }

    /// Manually release a participant. Returns `false` if it was not frozen.
    pub async fn unfreeze(&self, group: &GroupId, account: &AccountId) -> Result<bool> {
        let key = ParticipantKey::new(group.clone(), account.clone());
        self.engine.unfreeze(&key).await
    }

    pub async fn unfreeze_all(&self) -> Result<usize> {
        self.engine.unfreeze_all().await
    }

    #[must_use]
    pub fn frozen_accounts(&self) -> BTreeMap<GroupId, BTreeMap<AccountId, FreezeRecord>> {
        self.cache.frozen_accounts()
    }

    #[must_use]
    pub fn participant(&self, account: &AccountId) -> Option<Participant> {
        self.cache.participant(account)
    }

    #[must_use]
    pub fn group(&self, group: &GroupId) -> Option<GroupView> {
        self.cache.group(group)
    }

    #[must_use]
    pub fn group_participants(&self, group: &GroupId) -> Vec<Participant> {
        self.cache.group_participants(group)
    }

    #[must_use]
    pub fn user(&self, user: &UserId) -> Option<UserProfile> {
        self.cache.user(user)
    }

    /// Remove an account from every group, cleaning up its freezes,
    /// trackers and connections, and mark its enrollments removed.
    ///
    /// Returns how many group memberships were dropped from the cache.
    pub async fn remove_participant(&self, account: &AccountId) -> Result<usize> {
        let keys = self.cache.keys_of(account);
        for key in &keys {
            self.engine.discard(key).await;
            let tracker = self.cache.participant_in(key).and_then(|p| p.tracker_id);
            if let Some(tracker) = tracker {
                if let Err(e) = self.trackers.remove_tracker(account, &tracker).await {
                    warn!(account_id = %account, tracker_id = %tracker, error = %e, "Failed to remove tracker");
                }
            }
            self.connections.remove(key);
        }
        let removed = self.cache.remove_participant(account);
        let persisted = self
            .repo
            .set_participant_status(account, None, ParticipantStatus::Removed)
            .await?;
        info!(
            account_id = %account,
            groups = removed.len(),
            persisted,
            "Participant removed"
        );
        Ok(removed.len())
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; start() already ran this cycle.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(cycle = name, "Refresh loop stopping");
                    break;
                }
                _ = interval.tick() => tick().await,
            }
        }
    })
}

/// Handle returned by [`Desk::start`].
pub struct DeskHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    engine: Arc<FreezeEngine>,
}

impl DeskHandle {
    /// Stop the loops and the listener, then cancel pending release timers.
    ///
    /// Persisted freezes stay active and are restored on the next start.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Desk task ended abnormally");
            }
        }
        let cancelled = self.engine.shutdown();
        info!(cancelled_timers = cancelled, "Risk desk stopped");
    }
}
