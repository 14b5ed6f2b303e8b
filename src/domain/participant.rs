//! Participants: accounts enrolled in a group, and the cached trading view of them.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::group::Group;
use super::id::{AccountId, DealId, GroupId, ParticipantKey, TrackerId, UserId};
use super::trading::{AccountInformation, Deal, Order, Position, TerminalState};

/// Enrollment status of a participant record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Pending,
    Approved,
    Rejected,
    Removed,
    /// The broker connection could not be established; evicted from the cache.
    Disconnected,
}

impl ParticipantStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Removed => "removed",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "removed" => Ok(Self::Removed),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Contact details of the user owning an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Persisted enrollment of an account in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub user_id: UserId,
    pub status: ParticipantStatus,
    /// The account's own drawdown baseline, if one has been established.
    pub initial_balance: Option<Decimal>,
    pub tracker_id: Option<TrackerId>,
    pub joined_at: DateTime<Utc>,
}

impl ParticipantRecord {
    #[must_use]
    pub fn key(&self) -> ParticipantKey {
        ParticipantKey::new(self.group_id.clone(), self.account_id.clone())
    }
}

/// Cached, continuously refreshed view of one participant.
///
/// Structural fields come from persistence; financial fields and the
/// position/order snapshots come from the broker; deals are appended by
/// push events and bounded to the newest `deal_limit` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub account_id: AccountId,
    pub group_id: GroupId,
    pub user_id: UserId,
    /// Broker-side account name.
    pub name: String,
    pub user_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub balance: Decimal,
    pub equity: Decimal,
    /// The account's own drawdown baseline.
    pub initial_balance: Decimal,
    /// P&L relative to the group's initial balance.
    pub pnl_percentage: Decimal,
    /// P&L relative to the account's own baseline.
    pub current_pnl_percentage: Decimal,
    pub profit_loss: Decimal,
    pub freeze_count: u32,
    pub trade_count: u32,
    pub deals: VecDeque<Deal>,
    pub positions: Vec<Position>,
    pub orders: Vec<Order>,
    pub tracker_id: Option<TrackerId>,
    /// Enrollment time; breaks leaderboard ties.
    pub joined_at: DateTime<Utc>,
    #[serde(skip)]
    group_initial_balance: Decimal,
    #[serde(skip)]
    deal_limit: usize,
}

impl Participant {
    /// Build the cached view from a persisted record and its user profile.
    #[must_use]
    pub fn from_record(
        record: &ParticipantRecord,
        user: Option<&UserProfile>,
        group: &Group,
        deal_limit: usize,
    ) -> Self {
        Self {
            account_id: record.account_id.clone(),
            group_id: record.group_id.clone(),
            user_id: record.user_id.clone(),
            name: String::new(),
            user_name: user.map(UserProfile::full_name).unwrap_or_default(),
            email: user.and_then(|u| u.email.clone()),
            phone_number: user.and_then(|u| u.phone_number.clone()),
            balance: Decimal::ZERO,
            equity: Decimal::ZERO,
            initial_balance: record.initial_balance.unwrap_or(Decimal::ZERO),
            pnl_percentage: Decimal::ZERO,
            current_pnl_percentage: Decimal::ZERO,
            profit_loss: Decimal::ZERO,
            freeze_count: 0,
            trade_count: 0,
            deals: VecDeque::new(),
            positions: Vec::new(),
            orders: Vec::new(),
            tracker_id: record.tracker_id.clone(),
            joined_at: record.joined_at,
            group_initial_balance: group.initial_balance,
            deal_limit,
        }
    }

    #[must_use]
    pub fn key(&self) -> ParticipantKey {
        ParticipantKey::new(self.group_id.clone(), self.account_id.clone())
    }

    /// Apply balance and equity figures and recompute P&L.
    ///
    /// Returns `true` when this call established the account's baseline,
    /// which the caller should persist.
    pub fn apply_account_information(&mut self, info: &AccountInformation) -> bool {
        if let Some(name) = info.name.as_ref().filter(|n| !n.is_empty()) {
            self.name.clone_from(name);
        }
        self.balance = info.balance;
        self.equity = info.equity;

        let adopted = self.initial_balance <= Decimal::ZERO && info.balance > Decimal::ZERO;
        if adopted {
            self.initial_balance = info.balance;
        }
        self.recompute_pnl();
        adopted
    }

    /// Replace financials, positions and orders from a terminal snapshot.
    pub fn apply_terminal_state(&mut self, state: &TerminalState) -> bool {
        self.positions.clone_from(&state.positions);
        self.orders.clone_from(&state.orders);
        self.apply_account_information(&state.account_information)
    }

    /// Append a deal unless one with the same id is already present.
    ///
    /// Returns `true` if the deal was new.
    pub fn record_deal(&mut self, deal: Deal) -> bool {
        if self.has_deal(&deal.id) {
            return false;
        }
        self.deals.push_back(deal);
        while self.deals.len() > self.deal_limit {
            self.deals.pop_front();
        }
        self.trade_count = self.trade_count.saturating_add(1);
        true
    }

    #[must_use]
    pub fn has_deal(&self, id: &DealId) -> bool {
        self.deals.iter().any(|d| &d.id == id)
    }

    /// Reset the drawdown baseline to the current equity. Without equity
    /// data the baseline is kept.
    pub fn rebaseline(&mut self) -> Decimal {
        if self.equity > Decimal::ZERO {
            self.initial_balance = self.equity;
            self.recompute_pnl();
        }
        self.initial_balance
    }

    /// Carry fast-path state from the previous cached view into a freshly
    /// rebuilt one so a structural refresh never clobbers it.
    pub fn merge_fast_path(&mut self, previous: &Self) {
        self.name.clone_from(&previous.name);
        self.balance = previous.balance;
        self.equity = previous.equity;
        if previous.initial_balance > Decimal::ZERO {
            self.initial_balance = previous.initial_balance;
        }
        self.positions.clone_from(&previous.positions);
        self.orders.clone_from(&previous.orders);
        self.trade_count = self.trade_count.max(previous.trade_count);
        for deal in &previous.deals {
            if !self.has_deal(&deal.id) {
                self.deals.push_back(deal.clone());
            }
        }
        self.deals.make_contiguous().sort_by_key(|d| d.time);
        while self.deals.len() > self.deal_limit {
            self.deals.pop_front();
        }
        if previous.tracker_id.is_some() && self.tracker_id.is_none() {
            self.tracker_id.clone_from(&previous.tracker_id);
        }
        self.recompute_pnl();
    }

    /// Seed the deal history from persisted deals, oldest first.
    pub fn seed_deals(&mut self, deals: impl IntoIterator<Item = Deal>) {
        for deal in deals {
            self.record_deal(deal);
        }
    }

    fn recompute_pnl(&mut self) {
        let own = percent_change(self.equity, self.initial_balance);
        self.current_pnl_percentage = own;

        let reference = if self.group_initial_balance > Decimal::ZERO {
            self.group_initial_balance
        } else {
            self.initial_balance
        };
        self.pnl_percentage = percent_change(self.equity, reference);
        self.profit_loss = if reference > Decimal::ZERO {
            (self.equity - reference).round_dp(2)
        } else {
            Decimal::ZERO
        };
    }
}

fn percent_change(value: Decimal, reference: Decimal) -> Decimal {
    if reference <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((value - reference) / reference * Decimal::ONE_HUNDRED).round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn group(initial: Decimal) -> Group {
        Group::try_new(GroupId::new("g"), "G", dec!(10), 0, initial).unwrap()
    }

    fn record() -> ParticipantRecord {
        ParticipantRecord {
            group_id: GroupId::new("g"),
            account_id: AccountId::new("a"),
            user_id: UserId::new("u"),
            status: ParticipantStatus::Approved,
            initial_balance: None,
            tracker_id: None,
            joined_at: Utc::now(),
        }
    }

    fn deal(id: &str, secs: i64) -> Deal {
        Deal {
            id: DealId::new(id),
            symbol: Some("EURUSD".into()),
            kind: "DEAL_TYPE_BUY".into(),
            volume: Some(dec!(0.1)),
            price: None,
            profit: None,
            time: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    fn info(balance: Decimal, equity: Decimal) -> AccountInformation {
        AccountInformation {
            name: Some("Demo".into()),
            balance,
            equity,
            currency: None,
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ParticipantStatus::Pending,
            ParticipantStatus::Approved,
            ParticipantStatus::Removed,
            ParticipantStatus::Disconnected,
        ] {
            assert_eq!(status.as_str().parse::<ParticipantStatus>(), Ok(status));
        }
        assert!("banned".parse::<ParticipantStatus>().is_err());
    }

    #[test]
    fn first_account_information_establishes_baseline() {
        let mut p = Participant::from_record(&record(), None, &group(dec!(0)), 10);
        assert!(p.apply_account_information(&info(dec!(1000), dec!(1000))));
        assert!(!p.apply_account_information(&info(dec!(1000), dec!(900))));
        assert_eq!(p.initial_balance, dec!(1000));
        assert_eq!(p.current_pnl_percentage, dec!(-10));
        assert_eq!(p.pnl_percentage, dec!(-10));
        assert_eq!(p.profit_loss, dec!(-100));
        assert_eq!(p.name, "Demo");
    }

    #[test]
    fn group_balance_is_the_leaderboard_reference() {
        let mut p = Participant::from_record(&record(), None, &group(dec!(2000)), 10);
        p.apply_account_information(&info(dec!(1000), dec!(2200)));
        assert_eq!(p.pnl_percentage, dec!(10));
        assert_eq!(p.current_pnl_percentage, dec!(120));
        assert_eq!(p.profit_loss, dec!(200));
    }

    #[test]
    fn deals_are_deduplicated_and_bounded() {
        let mut p = Participant::from_record(&record(), None, &group(dec!(0)), 2);
        assert!(p.record_deal(deal("1", 1)));
        assert!(!p.record_deal(deal("1", 1)));
        assert!(p.record_deal(deal("2", 2)));
        assert!(p.record_deal(deal("3", 3)));
        assert_eq!(p.deals.len(), 2);
        assert_eq!(p.deals.front().unwrap().id.as_str(), "2");
        assert_eq!(p.trade_count, 3);
    }

    #[test]
    fn merge_keeps_fast_path_fields() {
        let g = group(dec!(0));
        let mut old = Participant::from_record(&record(), None, &g, 10);
        old.apply_account_information(&info(dec!(1000), dec!(1100)));
        old.record_deal(deal("1", 1));

        let mut fresh = Participant::from_record(&record(), None, &g, 10);
        fresh.record_deal(deal("2", 2));
        fresh.merge_fast_path(&old);

        assert_eq!(fresh.equity, dec!(1100));
        assert_eq!(fresh.initial_balance, dec!(1000));
        let ids: Vec<_> = fresh.deals.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn rebaseline_uses_current_equity() {
        let mut p = Participant::from_record(&record(), None, &group(dec!(0)), 10);
        p.apply_account_information(&info(dec!(1000), dec!(800)));
        assert_eq!(p.rebaseline(), dec!(800));
        assert_eq!(p.current_pnl_percentage, dec!(0));
    }
}
