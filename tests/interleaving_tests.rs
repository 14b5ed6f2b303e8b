//! Freeze transitions racing structural refreshes and manual releases.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use harness::GatedRepository;
use riskboard::adapter::memory::MemoryRepository;
use riskboard::adapter::notifier::NotifierRegistry;
use riskboard::adapter::paper::PaperGateway;
use riskboard::application::{Desk, DeskSettings, FreezeOutcome};
use riskboard::domain::{AccountId, GroupId, ParticipantKey};
use riskboard::port::Repository;
use riskboard::testkit::domain;
use riskboard::testkit::tracker::RecordingTrackerApi;
use rust_decimal_macros::dec;

struct Gated {
    inner: Arc<MemoryRepository>,
    repo: Arc<GatedRepository>,
    desk: Arc<Desk>,
}

async fn gated_desk() -> Gated {
    let inner = Arc::new(MemoryRepository::new());
    let repo = Arc::new(GatedRepository::new(Arc::clone(&inner)));
    let gateway = Arc::new(PaperGateway::new());
    let desk = Desk::new(
        Arc::clone(&repo) as Arc<dyn Repository>,
        Arc::clone(&gateway) as _,
        Arc::new(RecordingTrackerApi::new()) as _,
        NotifierRegistry::new(),
        DeskSettings {
            default_freeze_duration: Duration::from_secs(60),
            ..DeskSettings::default()
        },
    );

    let g = domain::group("cup", dec!(10));
    inner.save_group(&g).await.unwrap();
    inner.save_user(&domain::user("a1")).await.unwrap();
    inner.save_participant(&domain::record(&g, "a1")).await.unwrap();
    gateway.open_account("a1", dec!(1000));

    desk.refresh_structural().await.unwrap();
    desk.refresh_trading_data().await.unwrap();
    Gated { inner, repo, desk }
}

fn key() -> ParticipantKey {
    ParticipantKey::new("cup", "a1")
}

#[tokio::test]
async fn release_during_structural_refresh_is_not_undone() {
    let fx = gated_desk().await;
    let (cup, a1) = (GroupId::new("cup"), AccountId::new("a1"));
    assert!(matches!(
        fx.desk.freeze(&cup, &a1, "manual").await.unwrap(),
        FreezeOutcome::Frozen(_)
    ));

    let mut hold = fx.repo.hold("participants");
    let refresh = tokio::spawn({
        let desk = Arc::clone(&fx.desk);
        async move { desk.refresh_structural().await }
    });
    hold.reached().await;

    assert!(fx.desk.unfreeze(&cup, &a1).await.unwrap());
    hold.open();
    let outcome = refresh.await.unwrap().unwrap().unwrap();

    assert!(outcome.surfaced.is_empty());
    assert!(!fx.desk.cache().is_frozen(&key()));
    assert!(!fx.desk.engine().timers().is_pending(&key()));
    assert!(fx.inner.active_freezes().await.unwrap().is_empty());

    // A later refresh still agrees with persistence.
    fx.desk.refresh_structural().await.unwrap();
    assert!(fx.desk.frozen_accounts().is_empty());
}

#[tokio::test]
async fn freeze_after_a_release_is_still_surfaced() {
    let fx = gated_desk().await;
    let (cup, a1) = (GroupId::new("cup"), AccountId::new("a1"));
    fx.desk.freeze(&cup, &a1, "manual").await.unwrap();
    assert!(fx.desk.unfreeze(&cup, &a1).await.unwrap());

    // Persisted directly, as another process would.
    let record = domain::freeze(&key(), 30);
    fx.inner.create_freeze(&record).await.unwrap();

    let outcome = fx.desk.refresh_structural().await.unwrap().unwrap();
    assert_eq!(outcome.surfaced.len(), 1);
    assert!(fx.desk.cache().is_frozen(&key()));
    assert!(fx.desk.engine().timers().is_pending(&key()));
}

#[tokio::test]
async fn unfreeze_while_a_freeze_is_persisting_leaves_nothing_active() {
    let fx = gated_desk().await;
    let (cup, a1) = (GroupId::new("cup"), AccountId::new("a1"));

    let mut hold = fx.repo.hold("release_freezes");
    let freeze = tokio::spawn({
        let desk = Arc::clone(&fx.desk);
        let (cup, a1) = (cup.clone(), a1.clone());
        async move { desk.freeze(&cup, &a1, "manual").await }
    });
    hold.reached().await;

    assert!(fx.desk.unfreeze(&cup, &a1).await.unwrap());
    hold.open();
    let outcome = freeze.await.unwrap().unwrap();

    assert!(matches!(outcome, FreezeOutcome::Interrupted(_)));
    assert!(fx.inner.active_freezes().await.unwrap().is_empty());
    assert_eq!(fx.inner.all_freezes().len(), 1);
    assert!(!fx.desk.cache().is_frozen(&key()));
    assert!(!fx.desk.engine().timers().is_pending(&key()));

    fx.desk.refresh_structural().await.unwrap();
    assert!(fx.desk.frozen_accounts().is_empty());
}
