//! Paper brokerage gateway.
//!
//! Keeps simulated terminal state in memory. Used for dry runs
//! (`gateway.kind = "paper"`) and as the scriptable gateway in tests: equity,
//! positions and orders can be set directly, trade actions are recorded, and
//! connection or trade failures can be injected per account.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{
    AccountEvent, AccountEventKind, AccountId, AccountInformation, Order, OrderId, ParticipantKey,
    Position, PositionId, TerminalState,
};
use crate::error::{GatewayError, Result};
use crate::port::{AccountConnection, AccountGateway, EventSink};

/// One simulated brokerage account.
#[derive(Debug)]
pub struct PaperAccount {
    id: AccountId,
    state: RwLock<TerminalState>,
    connected: AtomicBool,
    reachable: AtomicBool,
    fail_trades: AtomicBool,
    fail_terminal: AtomicBool,
    cancelled: Mutex<Vec<OrderId>>,
    closed: Mutex<Vec<PositionId>>,
    reconnects: AtomicUsize,
}

impl PaperAccount {
    fn new(id: AccountId, balance: Decimal) -> Self {
        let state = TerminalState {
            account_information: AccountInformation {
                name: Some(format!("Paper {id}")),
                balance,
                equity: balance,
                currency: Some("USD".into()),
            },
            positions: Vec::new(),
            orders: Vec::new(),
        };
        Self {
            id,
            state: RwLock::new(state),
            connected: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            fail_trades: AtomicBool::new(false),
            fail_terminal: AtomicBool::new(false),
            cancelled: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            reconnects: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Set balance and equity.
    pub fn set_funds(&self, balance: Decimal, equity: Decimal) {
        let mut state = self.state.write();
        state.account_information.balance = balance;
        state.account_information.equity = equity;
    }

    /// Set equity, leaving balance untouched.
    pub fn set_equity(&self, equity: Decimal) {
        self.state.write().account_information.equity = equity;
    }

    pub fn set_positions(&self, positions: Vec<Position>) {
        self.state.write().positions = positions;
    }

    pub fn set_orders(&self, orders: Vec<Order>) {
        self.state.write().orders = orders;
    }

    #[must_use]
    pub fn terminal(&self) -> TerminalState {
        self.state.read().clone()
    }

    /// Mark the current connection stale. The next `reconnect` restores it.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Make the account unreachable (or reachable again).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Make every trade action fail.
    pub fn fail_trades(&self, fail: bool) {
        self.fail_trades.store(fail, Ordering::SeqCst);
    }

    /// Make terminal state reads time out.
    pub fn fail_terminal_state(&self, fail: bool) {
        self.fail_terminal.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn cancelled_orders(&self) -> Vec<OrderId> {
        self.cancelled.lock().clone()
    }

    #[must_use]
    pub fn closed_positions(&self) -> Vec<PositionId> {
        self.closed.lock().clone()
    }

    #[must_use]
    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn not_connected(&self) -> GatewayError {
        GatewayError::NotConnected {
            account_id: self.id.to_string(),
        }
    }

    fn check_trade(&self, action: &str) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(self.not_connected().into());
        }
        if self.fail_trades.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                action: action.to_string(),
                reason: "trading disabled".into(),
            }
            .into());
        }
        Ok(())
    }
}

/// In-memory gateway over a set of [`PaperAccount`]s.
pub struct PaperGateway {
    accounts: DashMap<AccountId, Arc<PaperAccount>>,
    sinks: DashMap<ParticipantKey, EventSink>,
    auto_open: Option<Decimal>,
    connects: AtomicUsize,
}

impl PaperGateway {
    /// Gateway that only knows explicitly opened accounts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            sinks: DashMap::new(),
            auto_open: None,
            connects: AtomicUsize::new(0),
        }
    }

    /// Gateway that opens unknown accounts on first connect with `balance`.
    #[must_use]
    pub fn auto_open(balance: Decimal) -> Self {
        Self {
            auto_open: Some(balance),
            ..Self::new()
        }
    }

    /// Open (or fetch) an account funded with `balance`.
    pub fn open_account(&self, id: impl Into<AccountId>, balance: Decimal) -> Arc<PaperAccount> {
        let id = id.into();
        self.accounts
            .entry(id.clone())
            .or_insert_with(|| Arc::new(PaperAccount::new(id, balance)))
            .clone()
    }

    #[must_use]
    pub fn account(&self, id: &AccountId) -> Option<Arc<PaperAccount>> {
        self.accounts.get(id).map(|a| Arc::clone(a.value()))
    }

    /// Number of successful `connect` calls.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Push an event on the sink registered for `key`.
    ///
    /// Returns `false` when no connection for `key` exists or the receiver is gone.
    pub async fn emit(&self, key: &ParticipantKey, kind: AccountEventKind) -> bool {
        let Some(sink) = self.sinks.get(key).map(|s| s.value().clone()) else {
            return false;
        };
        sink.send(AccountEvent::new(key.clone(), kind)).await.is_ok()
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountGateway for PaperGateway {
    async fn connect(
        &self,
        key: &ParticipantKey,
        events: EventSink,
    ) -> Result<Arc<dyn AccountConnection>> {
        let account = match (self.account(&key.account_id), self.auto_open) {
            (Some(account), _) => account,
            (None, Some(balance)) => self.open_account(key.account_id.clone(), balance),
            (None, None) => {
                return Err(GatewayError::AccountNotFound {
                    account_id: key.account_id.to_string(),
                }
                .into())
            }
        };
        if !account.reachable.load(Ordering::SeqCst) {
            return Err(account.not_connected().into());
        }
        account.connected.store(true, Ordering::SeqCst);
        self.sinks.insert(key.clone(), events);
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(account_id = %key.account_id, group_id = %key.group_id, "Paper account connected");
        Ok(Arc::new(PaperConnection {
            key: key.clone(),
            account,
        }))
    }

    fn name(&self) -> &'static str {
        "paper"
    }
}

/// Connection handle to a [`PaperAccount`].
pub struct PaperConnection {
    key: ParticipantKey,
    account: Arc<PaperAccount>,
}

#[async_trait]
impl AccountConnection for PaperConnection {
    fn key(&self) -> &ParticipantKey {
        &self.key
    }

    fn account_name(&self) -> Option<String> {
        self.account.state.read().account_information.name.clone()
    }

    fn is_connected(&self) -> bool {
        self.account.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<()> {
        if !self.account.reachable.load(Ordering::SeqCst) {
            return Err(self.account.not_connected().into());
        }
        self.account.connected.store(true, Ordering::SeqCst);
        self.account.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn terminal_state(&self) -> Result<TerminalState> {
        if !self.is_connected() {
            return Err(self.account.not_connected().into());
        }
        if self.account.fail_terminal.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout {
                what: format!("terminal state of {}", self.key.account_id),
            }
            .into());
        }
        Ok(self.account.terminal())
    }

    async fn close_position(&self, id: &PositionId) -> Result<()> {
        self.account.check_trade("POSITION_CLOSE_ID")?;
        self.account.state.write().positions.retain(|p| &p.id != id);
        self.account.closed.lock().push(id.clone());
        Ok(())
    }

    async fn cancel_order(&self, id: &OrderId) -> Result<()> {
        self.account.check_trade("ORDER_CANCEL")?;
        self.account.state.write().orders.retain(|o| &o.id != id);
        self.account.cancelled.lock().push(id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn position(id: &str) -> Position {
        Position {
            id: PositionId::new(id),
            symbol: "EURUSD".into(),
            side: "POSITION_TYPE_BUY".into(),
            volume: dec!(1),
            open_price: None,
            profit: None,
        }
    }

    #[tokio::test]
    async fn unknown_accounts_are_rejected_unless_auto_open() {
        let (tx, _rx) = mpsc::channel(4);
        let key = ParticipantKey::new("g", "a");

        let strict = PaperGateway::new();
        assert!(strict.connect(&key, tx.clone()).await.is_err());

        let lenient = PaperGateway::auto_open(dec!(5000));
        let conn = lenient.connect(&key, tx).await.unwrap();
        let state = conn.terminal_state().await.unwrap();
        assert_eq!(state.account_information.equity, dec!(5000));
        assert_eq!(lenient.connects(), 1);
    }

    #[tokio::test]
    async fn closing_positions_updates_state_and_records() {
        let gateway = PaperGateway::new();
        let account = gateway.open_account("a", dec!(1000));
        account.set_positions(vec![position("p1"), position("p2")]);
        let (tx, _rx) = mpsc::channel(4);
        let conn = gateway
            .connect(&ParticipantKey::new("g", "a"), tx)
            .await
            .unwrap();

        conn.close_position(&PositionId::new("p1")).await.unwrap();
        assert_eq!(account.closed_positions(), vec![PositionId::new("p1")]);
        assert_eq!(account.terminal().positions.len(), 1);

        account.fail_trades(true);
        assert!(conn.close_position(&PositionId::new("p2")).await.is_err());
    }

    #[tokio::test]
    async fn stale_connection_recovers_on_reconnect() {
        let gateway = PaperGateway::new();
        let account = gateway.open_account("a", dec!(1000));
        let (tx, _rx) = mpsc::channel(4);
        let conn = gateway
            .connect(&ParticipantKey::new("g", "a"), tx)
            .await
            .unwrap();

        account.drop_connection();
        assert!(!conn.is_connected());
        assert!(conn.terminal_state().await.is_err());
        conn.reconnect().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(account.reconnects(), 1);

        account.set_reachable(false);
        assert!(conn.reconnect().await.is_err());
    }

    #[tokio::test]
    async fn emit_reaches_registered_sink() {
        let gateway = PaperGateway::new();
        gateway.open_account("a", dec!(1000));
        let key = ParticipantKey::new("g", "a");
        let (tx, mut rx) = mpsc::channel(4);
        let _conn = gateway.connect(&key, tx).await.unwrap();

        let kind = AccountEventKind::PositionsReplaced { positions: vec![] };
        assert!(gateway.emit(&key, kind.clone()).await);
        assert_eq!(rx.recv().await.unwrap(), AccountEvent::new(key, kind));
        assert!(!gateway.emit(&ParticipantKey::new("g", "zz"), AccountEventKind::OrdersReplaced { orders: vec![] }).await);
    }
}
