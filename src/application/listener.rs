//! Push-event handling.
//!
//! [`AccountListener`] applies an event to the cache synchronously and
//! returns the follow-up work it calls for. [`ListenerHub`] drains the event
//! channel and runs that follow-up work as tracked tasks.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::{DealOutcome, StateCache};
use super::freeze::FreezeEngine;
use crate::domain::{
    AccountEvent, AccountEventKind, AccountId, Deal, ParticipantKey, DRAWDOWN_REASON,
};
use crate::port::Repository;

/// Follow-up work produced by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Freeze the participant.
    Freeze { key: ParticipantKey, reason: String },
    /// Liquidate new exposure of a frozen participant.
    Enforce(ParticipantKey),
    /// Store a received deal.
    PersistDeal { account: AccountId, deal: Deal },
    /// Store baselines established by an account update.
    PersistBaselines(Vec<(ParticipantKey, Decimal)>),
}

/// Applies events to the cache.
pub struct AccountListener {
    cache: Arc<StateCache>,
}

impl AccountListener {
    pub fn new(cache: Arc<StateCache>) -> Self {
        Self { cache }
    }

    /// Apply `event` and return the reaction it requires, if any.
    pub fn apply(&self, event: AccountEvent) -> Option<Reaction> {
        let AccountEvent { key, kind } = event;
        let account = &key.account_id;
        let label = kind.label();
        let trading = kind.is_trading_activity();

        let known = match kind {
            AccountEventKind::AccountInformationUpdated { information } => {
                let adopted = self.cache.apply_account_information(account, &information);
                if !adopted.is_empty() {
                    return Some(Reaction::PersistBaselines(adopted));
                }
                self.cache.participant(account).is_some()
            }
            AccountEventKind::OrderUpdated { order } => self.cache.upsert_order(account, &order),
            AccountEventKind::OrdersReplaced { orders } => {
                let empty = orders.is_empty();
                let known = self.cache.set_orders(account, orders);
                if empty {
                    return None;
                }
                known
            }
            AccountEventKind::OrderCompleted { order_id } => {
                self.cache.remove_order(account, &order_id)
            }
            AccountEventKind::PositionUpdated { position } => {
                self.cache.upsert_position(account, &position)
            }
            AccountEventKind::PositionsReplaced { positions } => {
                let empty = positions.is_empty();
                let known = self.cache.set_positions(account, positions);
                if empty {
                    return None;
                }
                known
            }
            AccountEventKind::PositionRemoved { position_id } => {
                self.cache.remove_position(account, &position_id)
            }
            AccountEventKind::DealAdded { deal } => {
                match self.cache.add_deal(account, deal.clone()) {
                    DealOutcome::Recorded(keys) => {
                        debug!(account_id = %account, deal_id = %deal.id, participants = keys.len(), "Deal recorded");
                    }
                    DealOutcome::Duplicate => {
                        debug!(account_id = %account, deal_id = %deal.id, "Duplicate deal ignored");
                    }
                    DealOutcome::Queued => {
                        debug!(account_id = %account, deal_id = %deal.id, "Deal queued for unknown account");
                    }
                    DealOutcome::Dropped => {
                        warn!(account_id = %account, deal_id = %deal.id, "Deal for unknown account dropped");
                    }
                }
                return Some(Reaction::PersistDeal {
                    account: account.clone(),
                    deal,
                });
            }
            AccountEventKind::DrawdownExceeded {
                tracker_id,
                relative_drawdown,
            } => {
                if self.cache.is_frozen(&key) {
                    debug!(account_id = %account, tracker_id = %tracker_id, "Tracker breach for frozen account ignored");
                    return None;
                }
                if self.cache.group_record(&key.group_id).is_none() {
                    warn!(account_id = %account, group_id = %key.group_id, "Tracker breach for unknown group");
                    return None;
                }
                info!(
                    account_id = %account,
                    group_id = %key.group_id,
                    tracker_id = %tracker_id,
                    relative_drawdown = %relative_drawdown,
                    "Tracker reported drawdown breach"
                );
                return Some(Reaction::Freeze {
                    key,
                    reason: DRAWDOWN_REASON.to_string(),
                });
            }
        };

        if !known {
            debug!(account_id = %account, event = label, "Event for uncached account");
            return None;
        }
        (trading && self.cache.is_frozen(&key)).then_some(Reaction::Enforce(key))
    }
}

/// Executes reactions against the freeze engine and the repository.
#[derive(Clone)]
pub struct ReactionRunner {
    engine: Arc<FreezeEngine>,
    repo: Arc<dyn Repository>,
}

impl ReactionRunner {
    pub fn new(engine: Arc<FreezeEngine>, repo: Arc<dyn Repository>) -> Self {
        Self { engine, repo }
    }

    pub async fn run(&self, reaction: Reaction) {
        match reaction {
            Reaction::Freeze { key, reason } => {
                if let Err(e) = self.engine.freeze(&key, &reason, true).await {
                    warn!(account_id = %key.account_id, group_id = %key.group_id, error = %e, "Freeze failed");
                }
            }
            Reaction::Enforce(key) => {
                warn!(account_id = %key.account_id, "Trading activity while frozen");
                self.engine.enforce(&key).await;
            }
            Reaction::PersistDeal { account, deal } => {
                if let Err(e) = self.repo.record_deal(&account, &deal).await {
                    warn!(account_id = %account, deal_id = %deal.id, error = %e, "Failed to persist deal");
                }
            }
            Reaction::PersistBaselines(baselines) => {
                for (key, baseline) in baselines {
                    if let Err(e) = self
                        .repo
                        .update_participant_baseline(&key, baseline, None)
                        .await
                    {
                        warn!(account_id = %key.account_id, error = %e, "Failed to persist baseline");
                    }
                }
            }
        }
    }
}

/// Drains the event channel until shutdown.
pub struct ListenerHub {
    listener: AccountListener,
    runner: ReactionRunner,
}

impl ListenerHub {
    pub fn new(listener: AccountListener, runner: ReactionRunner) -> Self {
        Self { listener, runner }
    }

    /// Run until `shutdown` flips to `true` or every sender is dropped.
    /// Reactions still running at shutdown are awaited.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<AccountEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Event listener shutting down");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("Event channel closed");
                        break;
                    };
                    if let Some(reaction) = self.listener.apply(event) {
                        let runner = self.runner.clone();
                        tasks.spawn(async move { runner.run(reaction).await });
                    }
                }
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = done {
                        warn!(error = %e, "Reaction task failed");
                    }
                }
            }
        }
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "Reaction task failed");
            }
        }
    }
}
