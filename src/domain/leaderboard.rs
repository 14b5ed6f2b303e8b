//! Leaderboard projection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::freeze::FreezeRecord;
use super::group::Group;
use super::id::{AccountId, GroupId, UserId};
use super::participant::Participant;

/// Public, ranked view of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub account_id: AccountId,
    pub name: String,
    pub pnl_percentage: Decimal,
    pub profit_loss: Decimal,
    pub balance: Decimal,
    pub equity: Decimal,
    pub total_freezes_count: u32,
    pub total_trades: u32,
    pub group_id: GroupId,
    pub group_name: String,
    pub user_id: UserId,
    pub user_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub is_frozen: bool,
    pub freeze_details: Option<FreezeRecord>,
}

/// A leaderboard stamped with the time it was projected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub timestamp: DateTime<Utc>,
    pub last_trading_refresh: Option<DateTime<Utc>>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Rank participants of one group by P&L percentage, best first.
///
/// Ties go to the participant who joined first. Ranks are positions
/// (1..=n), not dense ranks.
#[must_use]
pub fn rank(
    group: &Group,
    participants: &[Participant],
    frozen: &BTreeMap<AccountId, FreezeRecord>,
) -> Vec<LeaderboardEntry> {
    let mut sorted: Vec<&Participant> = participants.iter().collect();
    sorted.sort_by(|a, b| {
        b.pnl_percentage
            .cmp(&a.pnl_percentage)
            .then_with(|| a.joined_at.cmp(&b.joined_at))
    });

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, p)| {
            let freeze = frozen.get(&p.account_id).cloned();
            LeaderboardEntry {
                rank: index + 1,
                account_id: p.account_id.clone(),
                name: p.name.clone(),
                pnl_percentage: p.pnl_percentage,
                profit_loss: p.profit_loss,
                balance: p.balance,
                equity: p.equity,
                total_freezes_count: p.freeze_count,
                total_trades: p.trade_count,
                group_id: group.id.clone(),
                group_name: group.name.clone(),
                user_id: p.user_id.clone(),
                user_name: p.user_name.clone(),
                email: p.email.clone(),
                phone_number: p.phone_number.clone(),
                is_frozen: freeze.is_some(),
                freeze_details: freeze,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::participant::{ParticipantRecord, ParticipantStatus};
    use crate::domain::trading::AccountInformation;
    use rust_decimal_macros::dec;

    fn group() -> Group {
        Group::try_new(GroupId::new("g"), "Cup", dec!(10), 0, dec!(1000)).unwrap()
    }

    fn participant(group: &Group, account: &str, equity: Decimal) -> Participant {
        joined(group, account, equity, 0)
    }

    fn joined(group: &Group, account: &str, equity: Decimal, secs: i64) -> Participant {
        let record = ParticipantRecord {
            group_id: group.id.clone(),
            account_id: AccountId::new(account),
            user_id: UserId::new(format!("u-{account}")),
            status: ParticipantStatus::Approved,
            initial_balance: Some(dec!(1000)),
            tracker_id: None,
            joined_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
        };
        let mut p = Participant::from_record(&record, None, group, 10);
        p.apply_account_information(&AccountInformation {
            name: Some(account.to_uppercase()),
            balance: dec!(1000),
            equity,
            currency: None,
        });
        p
    }

    #[test]
    fn ranks_by_pnl() {
        let g = group();
        let ps = vec![
            joined(&g, "a", dec!(1050), 0),
            joined(&g, "b", dec!(1120), 1),
            joined(&g, "c", dec!(1120), 2),
        ];
        let board = rank(&g, &ps, &BTreeMap::new());
        let order: Vec<_> = board
            .iter()
            .map(|e| (e.account_id.as_str(), e.rank))
            .collect();
        assert_eq!(order, vec![("b", 1), ("c", 2), ("a", 3)]);
        assert_eq!(board[0].pnl_percentage, dec!(12));
        assert_eq!(board[0].group_name, "Cup");
    }

    #[test]
    fn ties_go_to_the_earlier_joiner() {
        let g = group();
        let ps = vec![
            joined(&g, "a", dec!(1100), 5),
            joined(&g, "b", dec!(1100), 1),
            joined(&g, "c", dec!(1100), 3),
        ];
        let order: Vec<_> = rank(&g, &ps, &BTreeMap::new())
            .into_iter()
            .map(|e| e.account_id.as_str().to_owned())
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn empty_group_yields_empty_board() {
        assert!(rank(&group(), &[], &BTreeMap::new()).is_empty());
    }

    #[test]
    fn frozen_entries_carry_details() {
        let g = group();
        let ps = vec![participant(&g, "a", dec!(800))];
        let mut frozen = BTreeMap::new();
        let record = FreezeRecord::open(
            &ps[0].key(),
            "manual",
            false,
            dec!(800),
            Utc::now(),
            std::time::Duration::from_secs(60),
        );
        frozen.insert(AccountId::new("a"), record.clone());

        let board = rank(&g, &ps, &frozen);
        assert!(board[0].is_frozen);
        assert_eq!(board[0].freeze_details, Some(record));
        let json = serde_json::to_value(&board[0]).unwrap();
        assert!(json.get("freezeDetails").is_some());
        assert!(json.get("totalFreezesCount").is_some());
    }
}
