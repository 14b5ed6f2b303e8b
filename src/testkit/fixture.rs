//! A desk wired to in-memory adapters.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use super::domain;
use super::tracker::RecordingTrackerApi;
use crate::adapter::memory::MemoryRepository;
use crate::adapter::notifier::NotifierRegistry;
use crate::adapter::paper::{PaperAccount, PaperGateway};
use crate::application::{Desk, DeskSettings};
use crate::domain::{Group, ParticipantKey};
use crate::port::Repository;

/// A [`Desk`] over a [`MemoryRepository`], a [`PaperGateway`] and a
/// [`RecordingTrackerApi`], all reachable for inspection.
pub struct DeskFixture {
    pub repo: Arc<MemoryRepository>,
    pub gateway: Arc<PaperGateway>,
    pub trackers: Arc<RecordingTrackerApi>,
    pub desk: Arc<Desk>,
}

impl DeskFixture {
    /// Fixture with default settings and a 60 second default freeze.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(DeskSettings {
            default_freeze_duration: Duration::from_secs(60),
            ..DeskSettings::default()
        })
    }

    #[must_use]
    pub fn with_settings(settings: DeskSettings) -> Self {
        Self::with_repo(Arc::new(MemoryRepository::new()), settings)
    }

    /// Fixture over an existing repository, as after a restart.
    #[must_use]
    pub fn with_repo(repo: Arc<MemoryRepository>, settings: DeskSettings) -> Self {
        Self::build(repo, settings, NotifierRegistry::new())
    }

    /// Fixture whose desk notifies through `notifier`.
    #[must_use]
    pub fn with_notifier(notifier: NotifierRegistry) -> Self {
        Self::build(
            Arc::new(MemoryRepository::new()),
            DeskSettings {
                default_freeze_duration: Duration::from_secs(60),
                ..DeskSettings::default()
            },
            notifier,
        )
    }

    fn build(repo: Arc<MemoryRepository>, settings: DeskSettings, notifier: NotifierRegistry) -> Self {
        let gateway = Arc::new(PaperGateway::new());
        let trackers = Arc::new(RecordingTrackerApi::new());
        let desk = Desk::new(
            Arc::clone(&repo) as Arc<dyn Repository>,
            Arc::clone(&gateway) as _,
            Arc::clone(&trackers) as _,
            notifier,
            settings,
        );
        Self {
            repo,
            gateway,
            trackers,
            desk,
        }
    }

    /// Persist a group with `threshold` percent and the default duration.
    pub async fn seed_group(&self, id: &str, threshold: Decimal) -> Group {
        let group = domain::group(id, threshold);
        self.repo.save_group(&group).await.expect("save group");
        group
    }

    /// Persist an approved participant with its user and open its paper
    /// account funded with 1000.
    pub async fn enroll(&self, group: &Group, account: &str) -> Arc<PaperAccount> {
        self.repo
            .save_user(&domain::user(account))
            .await
            .expect("save user");
        self.repo
            .save_participant(&domain::record(group, account))
            .await
            .expect("save participant");
        self.gateway
            .open_account(account, rust_decimal_macros::dec!(1000))
    }

    /// Load structure and pull one round of trading data.
    pub async fn sync(&self) {
        self.desk
            .refresh_structural()
            .await
            .expect("structural refresh");
        self.desk.refresh_trading_data().await;
    }

    #[must_use]
    pub fn key(group: &str, account: &str) -> ParticipantKey {
        ParticipantKey::new(group, account)
    }
}

impl Default for DeskFixture {
    fn default() -> Self {
        Self::new()
    }
}
