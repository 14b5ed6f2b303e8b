//! Leaderboard projection over cached participants.

use riskboard::domain::{AccountId, GroupId};
use riskboard::port::Repository;
use riskboard::testkit::domain;
use riskboard::testkit::fixture::DeskFixture;
use rust_decimal_macros::dec;

#[tokio::test]
async fn participants_are_ranked_by_pnl() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a").await.set_equity(dec!(1050));
    fx.enroll(&g, "b").await.set_equity(dec!(1120));
    fx.enroll(&g, "c").await.set_equity(dec!(1120));
    fx.sync().await;

    let board = fx.desk.leaderboard(&GroupId::new("cup"));
    let ranks: Vec<(&str, usize)> = board
        .iter()
        .map(|e| (e.account_id.as_str(), e.rank))
        .collect();
    assert_eq!(ranks, vec![("b", 1), ("c", 2), ("a", 3)]);

    let best = &board[0];
    assert_eq!(best.pnl_percentage, dec!(12.00));
    assert_eq!(best.profit_loss, dec!(120));
    assert_eq!(best.group_name, "CUP");
    assert_eq!(best.user_name, "Trader B");
    assert_eq!(best.email.as_deref(), Some("b@example.com"));
    assert!(!best.is_frozen);
    assert!(best.freeze_details.is_none());
}

#[tokio::test]
async fn ties_follow_enrollment_order_not_account_ids() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    let start = chrono::Utc::now();
    for (offset, account) in [(0, "zed"), (1, "mia"), (2, "amy")] {
        fx.repo.save_user(&domain::user(account)).await.unwrap();
        let mut record = domain::record(&g, account);
        record.joined_at = start + chrono::Duration::seconds(offset);
        fx.repo.save_participant(&record).await.unwrap();
        fx.gateway
            .open_account(account, dec!(1000))
            .set_equity(dec!(1100));
    }
    fx.sync().await;

    let order: Vec<String> = fx
        .desk
        .leaderboard(&GroupId::new("cup"))
        .into_iter()
        .map(|e| e.account_id.as_str().to_owned())
        .collect();
    assert_eq!(order, vec!["zed", "mia", "amy"]);

    let members: Vec<String> = fx
        .desk
        .group_participants(&GroupId::new("cup"))
        .into_iter()
        .map(|p| p.account_id.as_str().to_owned())
        .collect();
    assert_eq!(members, vec!["zed", "mia", "amy"]);
}

#[tokio::test]
async fn unknown_and_empty_groups_have_empty_boards() {
    let fx = DeskFixture::new();
    fx.seed_group("empty", dec!(10)).await;
    fx.sync().await;

    assert!(fx.desk.leaderboard(&GroupId::new("empty")).is_empty());
    assert!(fx.desk.leaderboard(&GroupId::new("missing")).is_empty());
    assert!(fx.desk.group(&GroupId::new("empty")).is_some());
    assert!(fx.desk.group(&GroupId::new("missing")).is_none());
}

#[tokio::test]
async fn groups_are_ranked_independently() {
    let fx = DeskFixture::new();
    let cup = fx.seed_group("cup", dec!(10)).await;
    let league = fx.seed_group("league", dec!(10)).await;
    fx.enroll(&cup, "a").await.set_equity(dec!(1010));
    fx.enroll(&league, "b").await.set_equity(dec!(990));
    fx.sync().await;

    let cup_board = fx.desk.leaderboard(&GroupId::new("cup"));
    let league_board = fx.desk.leaderboard(&GroupId::new("league"));
    assert_eq!(cup_board.len(), 1);
    assert_eq!(league_board.len(), 1);
    assert_eq!(league_board[0].rank, 1);
    assert_eq!(league_board[0].pnl_percentage, dec!(-1));
    assert_eq!(fx.desk.group_participants(&GroupId::new("league")).len(), 1);
}

#[tokio::test]
async fn snapshot_carries_refresh_time_and_freeze_flags() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a").await;
    fx.enroll(&g, "b").await;

    let before = fx.desk.snapshot(&GroupId::new("cup"));
    assert!(before.last_trading_refresh.is_none());
    assert!(before.leaderboard.is_empty());

    fx.sync().await;
    fx.desk
        .freeze(&GroupId::new("cup"), &AccountId::new("a"), "manual")
        .await
        .unwrap();

    let snapshot = fx.desk.snapshot(&GroupId::new("cup"));
    assert!(snapshot.last_trading_refresh.is_some());
    assert!(snapshot.timestamp >= snapshot.last_trading_refresh.unwrap());
    let frozen: Vec<bool> = snapshot.leaderboard.iter().map(|e| e.is_frozen).collect();
    assert_eq!(frozen, vec![true, false]);
    assert_eq!(snapshot.leaderboard[0].total_freezes_count, 1);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json["leaderboard"][0]["isFrozen"].as_bool().unwrap());
    assert!(json.get("lastTradingRefresh").is_some());
}

#[tokio::test]
async fn user_profiles_are_cached() {
    let fx = DeskFixture::new();
    let g = fx.seed_group("cup", dec!(10)).await;
    fx.enroll(&g, "a").await;
    fx.sync().await;

    let participant = fx.desk.participant(&AccountId::new("a")).unwrap();
    let user = fx.desk.user(&participant.user_id).unwrap();
    assert_eq!(user.full_name(), "Trader A");
    assert_eq!(participant.user_name, "Trader A");
}
