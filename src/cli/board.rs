//! One-shot leaderboard and freeze commands.
//!
//! Each command loads the current structure, acts, and exits. Pending
//! release timers are not kept; persisted freezes are picked up again by
//! the next `run`.

use tabled::{Table, Tabled};

use super::output;
use super::{LeaderboardArgs, UnfreezeArgs};
use crate::app::{App, Config};
use crate::domain::{AccountId, FreezeRecord, GroupId, LeaderboardEntry};
use crate::error::{Error, Result};

#[derive(Tabled)]
struct LeaderboardRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Trader")]
    trader: String,
    #[tabled(rename = "P&L %")]
    pnl_percentage: String,
    #[tabled(rename = "P&L")]
    profit_loss: String,
    #[tabled(rename = "Equity")]
    equity: String,
    #[tabled(rename = "Trades")]
    trades: u32,
    #[tabled(rename = "Freezes")]
    freezes: u32,
    #[tabled(rename = "Status")]
    status: &'static str,
}

impl From<&LeaderboardEntry> for LeaderboardRow {
    fn from(entry: &LeaderboardEntry) -> Self {
        Self {
            rank: entry.rank,
            account: entry.account_id.to_string(),
            trader: if entry.user_name.is_empty() {
                entry.name.clone()
            } else {
                entry.user_name.clone()
            },
            pnl_percentage: format!("{:.2}", entry.pnl_percentage),
            profit_loss: format!("{:.2}", entry.profit_loss),
            equity: format!("{:.2}", entry.equity),
            trades: entry.total_trades,
            freezes: entry.total_freezes_count,
            status: if entry.is_frozen { "frozen" } else { "active" },
        }
    }
}

#[derive(Tabled)]
struct FrozenRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Frozen at")]
    frozen_at: String,
    #[tabled(rename = "Release at")]
    release_time: String,
    #[tabled(rename = "Automated")]
    automated: bool,
}

impl From<&FreezeRecord> for FrozenRow {
    fn from(record: &FreezeRecord) -> Self {
        Self {
            group: record.group_id.to_string(),
            account: record.account_id.to_string(),
            reason: record.reason.clone(),
            frozen_at: record.frozen_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            release_time: record.release_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            automated: record.automated,
        }
    }
}

async fn prepared(config: &Config) -> Result<App> {
    let app = App::build(config).await?;
    app.prepare().await?;
    Ok(app)
}

/// Print a group's leaderboard after one trading refresh.
pub async fn leaderboard(config: &Config, args: &LeaderboardArgs) -> Result<()> {
    let app = prepared(config).await?;
    let group = GroupId::new(args.group.as_str());
    let Some(view) = app.desk().group(&group) else {
        app.close();
        return Err(Error::GroupNotFound(args.group.clone()));
    };
    app.desk().refresh_trading_data().await;
    let snapshot = app.desk().snapshot(&group);
    app.close();

    if args.json {
        return output::json(&snapshot);
    }
    output::section(&format!("Leaderboard: {}", view.group.name));
    if snapshot.leaderboard.is_empty() {
        output::note("No participants");
        return Ok(());
    }
    let rows: Vec<LeaderboardRow> = snapshot.leaderboard.iter().map(LeaderboardRow::from).collect();
    println!("{}", Table::new(rows));
    if let Some(at) = snapshot.last_trading_refresh {
        output::key_value("Refreshed", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

/// List frozen accounts grouped by group.
pub async fn frozen(config: &Config, json: bool) -> Result<()> {
    let app = prepared(config).await?;
    let frozen = app.desk().frozen_accounts();
    app.close();

    if json {
        return output::json(&frozen);
    }
    output::section("Frozen accounts");
    let rows: Vec<FrozenRow> = frozen
        .values()
        .flat_map(|accounts| accounts.values())
        .map(FrozenRow::from)
        .collect();
    if rows.is_empty() {
        output::note("No frozen accounts");
    } else {
        println!("{}", Table::new(rows));
    }
    Ok(())
}

/// Release one account.
pub async fn unfreeze(config: &Config, args: &UnfreezeArgs) -> Result<()> {
    let app = prepared(config).await?;
    let released = app
        .desk()
        .unfreeze(
            &GroupId::new(args.group.as_str()),
            &AccountId::new(args.account.as_str()),
        )
        .await;
    app.close();

    if released? {
        output::ok(&format!("Released {} in {}", args.account, args.group));
    } else {
        output::warn(&format!("{} is not frozen in {}", args.account, args.group));
    }
    Ok(())
}

/// Release every frozen account.
pub async fn unfreeze_all(config: &Config) -> Result<()> {
    let app = prepared(config).await?;
    let released = app.desk().unfreeze_all().await;
    app.close();
    output::ok(&format!("Released {} account(s)", released?));
    Ok(())
}
