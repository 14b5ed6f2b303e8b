//! Freeze lifecycle: breach, liquidation, timed and manual release, restore.

mod harness;

use std::time::Duration;

use harness::RecordingNotifier;
use riskboard::adapter::notifier::NotifierRegistry;
use riskboard::application::FreezeOutcome;
use riskboard::domain::{
    AccountEvent, AccountEventKind, AccountId, GroupId, OrderId, ParticipantStatus, PositionId,
    DRAWDOWN_REASON,
};
use riskboard::error::Error;
use riskboard::port::Repository;
use riskboard::testkit::domain::{freeze_releasing_in, order, position};
use riskboard::testkit::fixture::DeskFixture;
use rust_decimal_macros::dec;

fn cup() -> GroupId {
    GroupId::new("cup")
}

fn a1() -> AccountId {
    AccountId::new("a1")
}

#[tokio::test]
async fn drawdown_breach_freezes_and_liquidates() {
    let notifier = RecordingNotifier::new();
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(notifier.clone()));
    let fx = DeskFixture::with_notifier(registry);

    let g = fx.seed_group("cup", dec!(10)).await;
    let account = fx.enroll(&g, "a1").await;
    account.set_orders(vec![order("o1")]);
    account.set_positions(vec![position("p1")]);
    fx.sync().await;
    let key = DeskFixture::key("cup", "a1");
    assert!(!fx.desk.cache().is_frozen(&key));

    account.set_equity(dec!(850));
    let refresh = fx.desk.refresh_trading_data().await.unwrap();
    assert_eq!(refresh.breaches().count(), 1);

    assert!(fx.desk.cache().is_frozen(&key));
    assert_eq!(account.cancelled_orders(), vec![OrderId::new("o1")]);
    assert_eq!(account.closed_positions(), vec![PositionId::new("p1")]);

    let active = fx.repo.active_freezes().await.unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].automated);
    assert_eq!(active[0].reason, DRAWDOWN_REASON);
    assert_eq!(active[0].initial_equity, dec!(850));
    assert_eq!(fx.desk.participant(&a1()).unwrap().freeze_count, 1);
    assert_eq!(notifier.frozen(), 1);

    let board = fx.desk.leaderboard(&cup());
    assert!(board[0].is_frozen);
    assert!(board[0].freeze_details.is_some());
}

#[tokio::test]
async fn drawdown_below_threshold_does_not_freeze() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    let account = fx.enroll(&g, "a1").await;
    fx.sync().await;

    account.set_equity(dec!(901));
    fx.desk.refresh_trading_data().await.unwrap();
    assert!(fx.desk.frozen_accounts().is_empty());

    account.set_equity(dec!(900));
    fx.desk.refresh_trading_data().await.unwrap();
    assert_eq!(fx.desk.frozen_accounts()[&cup()].len(), 1);
}

#[tokio::test]
async fn zero_threshold_disables_freezing() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(0)).await;
    let account = fx.enroll(&g, "a1").await;
    fx.sync().await;

    account.set_equity(dec!(100));
    fx.desk.refresh_trading_data().await.unwrap();
    assert!(fx.desk.frozen_accounts().is_empty());
}

#[tokio::test]
async fn freezing_a_frozen_account_is_a_no_op() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;

    let first = fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    assert!(matches!(first, FreezeOutcome::Frozen(ref r) if !r.automated));
    let second = fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    assert_eq!(second, FreezeOutcome::AlreadyFrozen);

    assert_eq!(fx.repo.all_freezes().len(), 1);
    assert_eq!(fx.desk.participant(&a1()).unwrap().freeze_count, 1);
}

#[tokio::test]
async fn freezing_in_an_unknown_group_fails_without_mutation() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;

    let err = fx
        .desk
        .freeze(&GroupId::new("nope"), &a1(), "manual")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GroupNotFound(_)));

    let err = fx
        .desk
        .freeze(&cup(), &AccountId::new("ghost"), "manual")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParticipantNotFound(_)));

    assert!(fx.repo.all_freezes().is_empty());
    assert!(fx.desk.frozen_accounts().is_empty());
}

#[tokio::test]
async fn liquidation_failures_do_not_abort_the_freeze() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    let account = fx.enroll(&g, "a1").await;
    account.set_positions(vec![position("p1")]);
    fx.sync().await;

    account.fail_trades(true);
    fx.repo.fail_writes(true);
    let outcome = fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    assert!(matches!(outcome, FreezeOutcome::Frozen(_)));
    assert!(fx.desk.cache().is_frozen(&DeskFixture::key("cup", "a1")));
    assert!(account.closed_positions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn release_timer_unfreezes_and_rebaselines() {
    let notifier = RecordingNotifier::new();
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(notifier.clone()));
    let fx = DeskFixture::with_notifier(registry);

    let g = fx.seed_group("cup", dec!(10)).await;
    let account = fx.enroll(&g, "a1").await;
    fx.sync().await;
    let key = DeskFixture::key("cup", "a1");

    account.set_equity(dec!(850));
    fx.desk.refresh_trading_data().await.unwrap();
    assert!(fx.desk.cache().is_frozen(&key));
    assert!(fx.desk.engine().timers().is_pending(&key));

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(fx.desk.cache().is_frozen(&key));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!fx.desk.cache().is_frozen(&key));
    assert!(fx.repo.active_freezes().await.unwrap().is_empty());
    assert_eq!(notifier.released_automatically(), 1);

    let p = fx.desk.participant(&a1()).unwrap();
    assert_eq!(p.initial_balance, dec!(850));
    assert_eq!(p.current_pnl_percentage, dec!(0));

    let created = fx.trackers.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].1.name, "a1:cup");
    assert_eq!(created[0].1.threshold_percent, dec!(10));
    assert_eq!(p.tracker_id, Some(created[0].2.clone()));

    let record = fx.repo.participant_record(&key).unwrap();
    assert_eq!(record.initial_balance, Some(dec!(850)));

    // The new baseline keeps the account from re-freezing at once.
    fx.desk.refresh_trading_data().await.unwrap();
    assert!(!fx.desk.cache().is_frozen(&key));
}

#[tokio::test(start_paused = true)]
async fn manual_unfreeze_cancels_the_pending_timer() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;

    fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    assert!(fx.desk.unfreeze(&cup(), &a1()).await.unwrap());
    assert_eq!(fx.repo.release_writes(), 1);
    assert!(fx.desk.engine().timers().is_empty());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(fx.repo.release_writes(), 1);
    assert!(!fx.desk.unfreeze(&cup(), &a1()).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn refreezing_keeps_one_active_record() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;

    fx.desk.freeze(&cup(), &a1(), "first").await.unwrap();
    fx.desk.unfreeze(&cup(), &a1()).await.unwrap();
    fx.desk.freeze(&cup(), &a1(), "second").await.unwrap();

    let active = fx.repo.active_freezes().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].reason, "second");
    assert_eq!(fx.repo.all_freezes().len(), 2);
    assert_eq!(fx.desk.participant(&a1()).unwrap().freeze_count, 2);
}

#[tokio::test]
async fn restore_releases_elapsed_freezes() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    let key = DeskFixture::key("cup", "a1");
    fx.repo
        .create_freeze(&freeze_releasing_in(&key, -10))
        .await
        .unwrap();

    let handle = fx.desk.start().await.unwrap();
    assert!(!fx.desk.cache().is_frozen(&key));
    assert!(fx.repo.active_freezes().await.unwrap().is_empty());
    let record = &fx.repo.all_freezes()[0];
    assert!(!record.active);
    assert!(record.released_at.is_some());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restore_reschedules_pending_freezes() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    let key = DeskFixture::key("cup", "a1");
    fx.repo
        .create_freeze(&freeze_releasing_in(&key, 10))
        .await
        .unwrap();

    let handle = fx.desk.start().await.unwrap();
    assert!(fx.desk.cache().is_frozen(&key));
    assert!(fx.desk.engine().timers().is_pending(&key));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!fx.desk.cache().is_frozen(&key));
    assert!(fx.repo.active_freezes().await.unwrap().is_empty());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restore_collapses_duplicate_active_records() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    let key = DeskFixture::key("cup", "a1");

    let older = freeze_releasing_in(&key, 30);
    let mut newer = freeze_releasing_in(&key, 300);
    newer.frozen_at = older.frozen_at + chrono::Duration::minutes(5);
    fx.repo.create_freeze(&older).await.unwrap();
    fx.repo.create_freeze(&newer).await.unwrap();

    let report = fx.desk.engine().restore_freeze_timeouts().await.unwrap();
    assert_eq!(report.collapsed, 1);
    assert_eq!(report.rescheduled, 1);

    let active = fx.repo.active_freezes().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, newer.id);
    assert_eq!(
        fx.desk.cache().frozen(&key).map(|r| r.id),
        Some(newer.id.clone())
    );
}

#[tokio::test]
async fn unfreeze_all_repairs_persisted_only_freezes() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.enroll(&g, "a2").await;
    fx.sync().await;

    fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    fx.repo
        .create_freeze(&freeze_releasing_in(&DeskFixture::key("cup", "a2"), 600))
        .await
        .unwrap();

    assert_eq!(fx.desk.unfreeze_all().await.unwrap(), 2);
    assert!(fx.repo.active_freezes().await.unwrap().is_empty());
    assert!(fx.desk.frozen_accounts().is_empty());
    assert!(fx.desk.engine().timers().is_empty());
}

#[tokio::test]
async fn removing_a_participant_cleans_up_its_freeze() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;
    let key = DeskFixture::key("cup", "a1");

    fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    assert_eq!(fx.desk.remove_participant(&a1()).await.unwrap(), 1);

    assert!(fx.desk.participant(&a1()).is_none());
    assert!(!fx.desk.cache().is_frozen(&key));
    assert!(fx.desk.engine().timers().is_empty());
    assert!(fx.repo.active_freezes().await.unwrap().is_empty());
    assert_eq!(
        fx.repo.participant_record(&key).unwrap().status,
        ParticipantStatus::Removed
    );

    // The next structural refresh does not bring it back.
    fx.desk.refresh_structural().await.unwrap();
    assert!(fx.desk.participant(&a1()).is_none());
}

#[tokio::test]
async fn trading_activity_while_frozen_is_liquidated() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    let account = fx.enroll(&g, "a1").await;
    fx.sync().await;
    let key = DeskFixture::key("cup", "a1");
    fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();

    account.set_orders(vec![order("o2")]);
    fx.desk
        .ingest(AccountEvent::new(
            key,
            AccountEventKind::OrderUpdated { order: order("o2") },
        ))
        .await;
    assert_eq!(account.cancelled_orders(), vec![OrderId::new("o2")]);
}

#[tokio::test]
async fn tracker_breach_event_freezes() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;

    let raw = r#"{
        "accountId": "a1",
        "groupId": "cup",
        "type": "drawdownExceeded",
        "trackerId": "trk-9",
        "relativeDrawdown": 0.12
    }"#;
    tokio_test::assert_ok!(fx.desk.ingest_raw(raw).await);

    let record = fx
        .desk
        .cache()
        .frozen(&DeskFixture::key("cup", "a1"))
        .unwrap();
    assert!(record.automated);
    assert_eq!(fx.repo.active_freezes().await.unwrap().len(), 1);

    // A second breach report for the frozen account changes nothing.
    fx.desk.ingest_raw(raw).await.unwrap();
    assert_eq!(fx.repo.all_freezes().len(), 1);
}

#[tokio::test]
async fn malformed_events_are_rejected() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    fx.sync().await;

    let missing_field = r#"{"accountId":"a1","groupId":"cup","type":"drawdownExceeded"}"#;
    assert!(matches!(
        fx.desk.ingest_raw(missing_field).await,
        Err(Error::Gateway(_))
    ));
    let unknown_kind = r#"{"accountId":"a1","groupId":"cup","type":"somethingElse"}"#;
    assert!(fx.desk.ingest_raw(unknown_kind).await.is_err());
    assert!(fx.desk.frozen_accounts().is_empty());
}

#[tokio::test]
async fn unreachable_accounts_are_evicted() {
    let notifier = RecordingNotifier::new();
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(notifier.clone()));
    let fx = DeskFixture::with_notifier(registry);

    let g = fx.seed_group("cup", dec!(10)).await;
    let healthy = fx.enroll(&g, "a1").await;
    let broken = fx.enroll(&g, "a2").await;
    fx.sync().await;

    broken.set_reachable(false);
    healthy.set_equity(dec!(1100));
    fx.desk.refresh_trading_data().await.unwrap();

    assert!(fx.desk.participant(&AccountId::new("a2")).is_none());
    assert_eq!(
        fx.repo
            .participant_record(&DeskFixture::key("cup", "a2"))
            .unwrap()
            .status,
        ParticipantStatus::Disconnected
    );
    assert_eq!(notifier.evicted(), 1);
    assert_eq!(fx.desk.participant(&a1()).unwrap().equity, dec!(1100));
}

#[tokio::test]
async fn evicting_a_frozen_account_drops_its_transient_freeze() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    let account = fx.enroll(&g, "a1").await;
    fx.sync().await;
    let key = DeskFixture::key("cup", "a1");

    fx.desk.freeze(&cup(), &a1(), "manual").await.unwrap();
    account.set_reachable(false);
    fx.desk.refresh_trading_data().await.unwrap();

    assert!(fx.desk.participant(&a1()).is_none());
    assert!(fx.desk.frozen_accounts().is_empty());
    assert!(!fx.desk.engine().timers().is_pending(&key));
    assert_eq!(fx.repo.active_freezes().await.unwrap().len(), 1);

    // Disconnected enrollments are not reloaded, so neither is the freeze.
    fx.desk.refresh_structural().await.unwrap();
    assert!(fx.desk.frozen_accounts().is_empty());
}

#[tokio::test]
async fn pushed_events_flow_through_the_listener() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a1").await;
    let handle = fx.desk.start().await.unwrap();
    let key = DeskFixture::key("cup", "a1");

    let sent = fx
        .gateway
        .emit(
            &key,
            AccountEventKind::DealAdded {
                deal: riskboard::testkit::domain::deal("d1", 1),
            },
        )
        .await;
    assert!(sent);

    let mut trades = 0;
    for _ in 0..100 {
        trades = fx.desk.participant(&a1()).unwrap().trade_count;
        if trades == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(trades, 1);

    handle.shutdown().await;
    assert_eq!(fx.repo.deals(&a1(), 10).await.unwrap().len(), 1);
}
