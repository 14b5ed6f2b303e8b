//! Builders for domain values used across tests.
//!
//! Groups default to an initial balance of 1000 and no freeze duration of
//! their own; participants start from a 1000 baseline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{
    AccountInformation, Deal, DealId, FreezeRecord, Group, GroupId, Order, OrderId, Participant,
    ParticipantKey, ParticipantRecord, ParticipantStatus, Position, PositionId, UserId,
    UserProfile,
};

/// Deal history bound used by built participants.
pub const DEAL_LIMIT: usize = 100;

const EPOCH: i64 = 1_700_000_000;

/// A group with `threshold` percent drawdown and the default duration.
pub fn group(id: &str, threshold: Decimal) -> Group {
    Group::try_new(GroupId::new(id), id.to_uppercase(), threshold, 0, dec!(1000))
        .expect("valid group")
}

/// A group with an explicit freeze duration.
pub fn group_with_duration(id: &str, threshold: Decimal, duration: Duration) -> Group {
    let millis = u64::try_from(duration.as_millis()).expect("duration fits in u64");
    Group::try_new(GroupId::new(id), id.to_uppercase(), threshold, millis, dec!(1000))
        .expect("valid group")
}

/// An approved enrollment of `account` with a 1000 baseline.
pub fn record(group: &Group, account: &str) -> ParticipantRecord {
    ParticipantRecord {
        group_id: group.id.clone(),
        account_id: account.into(),
        user_id: UserId::new(format!("u-{account}")),
        status: ParticipantStatus::Approved,
        initial_balance: Some(dec!(1000)),
        tracker_id: None,
        joined_at: Utc::now(),
    }
}

/// The user behind [`record`].
pub fn user(account: &str) -> UserProfile {
    UserProfile {
        id: UserId::new(format!("u-{account}")),
        first_name: "Trader".into(),
        last_name: account.to_uppercase(),
        email: Some(format!("{account}@example.com")),
        phone_number: None,
    }
}

/// A cached participant with balance 1000 and the given equity.
pub fn participant(group: &Group, account: &str, equity: Decimal) -> Participant {
    let mut p = Participant::from_record(&record(group, account), None, group, DEAL_LIMIT);
    p.apply_account_information(&AccountInformation {
        name: Some(account.to_uppercase()),
        balance: dec!(1000),
        equity,
        currency: Some("USD".into()),
    });
    p
}

/// A buy deal stamped `secs` seconds after a fixed epoch.
pub fn deal(id: &str, secs: i64) -> Deal {
    Deal {
        id: DealId::new(id),
        symbol: Some("EURUSD".into()),
        kind: "DEAL_TYPE_BUY".into(),
        volume: Some(dec!(0.1)),
        price: Some(dec!(1.1)),
        profit: Some(Decimal::ZERO),
        time: DateTime::from_timestamp(EPOCH + secs, 0).unwrap_or_default(),
    }
}

pub fn position(id: &str) -> Position {
    Position {
        id: PositionId::new(id),
        symbol: "EURUSD".into(),
        side: "POSITION_TYPE_BUY".into(),
        volume: dec!(0.1),
        open_price: Some(dec!(1.1)),
        profit: None,
    }
}

pub fn order(id: &str) -> Order {
    Order {
        id: OrderId::new(id),
        symbol: "EURUSD".into(),
        kind: "ORDER_TYPE_BUY_LIMIT".into(),
        volume: dec!(0.1),
        open_price: Some(dec!(1.05)),
        state: Some("ORDER_STATE_PLACED".into()),
    }
}

/// An active automated freeze opened now and lasting `secs` seconds.
pub fn freeze(key: &ParticipantKey, secs: u64) -> FreezeRecord {
    FreezeRecord::open(
        key,
        crate::domain::DRAWDOWN_REASON,
        true,
        dec!(900),
        Utc::now(),
        Duration::from_secs(secs),
    )
}

/// An active freeze whose release time is `offset_secs` from now
/// (negative for an already elapsed one).
pub fn freeze_releasing_in(key: &ParticipantKey, offset_secs: i64) -> FreezeRecord {
    let now = Utc::now();
    let mut record = freeze(key, 0);
    record.frozen_at = now - chrono::Duration::hours(1);
    record.release_time = now + chrono::Duration::seconds(offset_secs);
    record
}
