#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use riskboard::adapter::memory::MemoryRepository;
use riskboard::domain::{
    AccountId, Deal, FreezeId, FreezeRecord, Group, GroupId, ParticipantKey, ParticipantRecord,
    ParticipantStatus, TrackerId, UserId, UserProfile,
};
use riskboard::error::Result;
use riskboard::port::{Event, Notifier, Repository};
use rust_decimal::Decimal;
use tokio::sync::oneshot;

/// Thread-safe event collector for notification assertions in tests.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("lock notifier events").len()
    }

    pub fn frozen(&self) -> usize {
        self.count(|e| matches!(e, Event::AccountFrozen(_)))
    }

    pub fn released(&self) -> usize {
        self.count(|e| matches!(e, Event::AccountReleased { .. }))
    }

    pub fn released_automatically(&self) -> usize {
        self.count(|e| matches!(e, Event::AccountReleased { automatic: true, .. }))
    }

    pub fn evicted(&self) -> usize {
        self.count(|e| matches!(e, Event::ParticipantEvicted { .. }))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events
            .lock()
            .expect("lock notifier events")
            .iter()
            .filter(|e| pred(e))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        self.events
            .lock()
            .expect("lock notifier events")
            .push(event);
    }
}

/// Write `contents` to a config file inside `dir`.
pub fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("riskboard.toml");
    std::fs::write(&path, contents).expect("write temp config");
    path
}

/// A [`MemoryRepository`] that can park the next call to one method until
/// the test lets it through.
pub struct GatedRepository {
    inner: Arc<MemoryRepository>,
    gate: Mutex<Option<Gate>>,
}

struct Gate {
    method: &'static str,
    reached: oneshot::Sender<()>,
    open: oneshot::Receiver<()>,
}

/// Test side of a parked call.
pub struct Hold {
    reached: oneshot::Receiver<()>,
    open: oneshot::Sender<()>,
}

impl Hold {
    /// Wait until the parked call has started.
    pub async fn reached(&mut self) {
        (&mut self.reached).await.expect("gated call never reached");
    }

    /// Let the parked call continue.
    pub fn open(self) {
        let _ = self.open.send(());
    }
}

impl GatedRepository {
    pub fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Park the next call to `method`.
    pub fn hold(&self, method: &'static str) -> Hold {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (open_tx, open_rx) = oneshot::channel();
        *self.gate.lock().expect("lock gate") = Some(Gate {
            method,
            reached: reached_tx,
            open: open_rx,
        });
        Hold {
            reached: reached_rx,
            open: open_tx,
        }
    }

    async fn pass(&self, method: &'static str) {
        let gate = {
            let mut slot = self.gate.lock().expect("lock gate");
            match slot.take() {
                Some(gate) if gate.method == method => Some(gate),
                other => {
                    *slot = other;
                    None
                }
            }
        };
        if let Some(gate) = gate {
            let _ = gate.reached.send(());
            let _ = gate.open.await;
        }
    }
}

#[async_trait]
impl Repository for GatedRepository {
    async fn groups(&self) -> Result<Vec<Group>> {
        self.pass("groups").await;
        self.inner.groups().await
    }

    async fn group(&self, id: &GroupId) -> Result<Option<Group>> {
        self.inner.group(id).await
    }

    async fn participants(
        &self,
        group: &GroupId,
        status: ParticipantStatus,
    ) -> Result<Vec<ParticipantRecord>> {
        self.pass("participants").await;
        self.inner.participants(group, status).await
    }

    async fn set_participant_status(
        &self,
        account: &AccountId,
        group: Option<&GroupId>,
        status: ParticipantStatus,
    ) -> Result<usize> {
        self.inner.set_participant_status(account, group, status).await
    }

    async fn update_participant_baseline(
        &self,
        key: &ParticipantKey,
        baseline: Decimal,
        tracker: Option<&TrackerId>,
    ) -> Result<()> {
        self.inner
            .update_participant_baseline(key, baseline, tracker)
            .await
    }

    async fn user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        self.inner.user(id).await
    }

    async fn deals(&self, account: &AccountId, limit: usize) -> Result<Vec<Deal>> {
        self.inner.deals(account, limit).await
    }

    async fn record_deal(&self, account: &AccountId, deal: &Deal) -> Result<bool> {
        self.inner.record_deal(account, deal).await
    }

    async fn create_freeze(&self, record: &FreezeRecord) -> Result<()> {
        self.pass("create_freeze").await;
        self.inner.create_freeze(record).await
    }

    async fn active_freezes(&self) -> Result<Vec<FreezeRecord>> {
        self.pass("active_freezes").await;
        self.inner.active_freezes().await
    }

    async fn freeze_history(&self, key: &ParticipantKey) -> Result<u32> {
        self.inner.freeze_history(key).await
    }

    async fn release_freezes(&self, key: &ParticipantKey, at: DateTime<Utc>) -> Result<usize> {
        self.pass("release_freezes").await;
        self.inner.release_freezes(key, at).await
    }

    async fn deactivate_freeze(&self, id: &FreezeId, at: DateTime<Utc>) -> Result<()> {
        self.inner.deactivate_freeze(id, at).await
    }

    async fn save_group(&self, group: &Group) -> Result<()> {
        self.inner.save_group(group).await
    }

    async fn save_participant(&self, record: &ParticipantRecord) -> Result<()> {
        self.inner.save_participant(record).await
    }

    async fn save_user(&self, user: &UserProfile) -> Result<()> {
        self.inner.save_user(user).await
    }
}
