//! MetaApi account gateway and connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::MetaApiClient;
use super::dto::TradeRequest;
use super::MetaApiSettings;
use crate::domain::{
    AccountEvent, AccountEventKind, AccountId, OrderId, ParticipantKey, PositionId, TerminalState,
};
use crate::error::{GatewayError, Result};
use crate::port::{AccountConnection, AccountGateway, EventSink};

/// Gateway backed by the MetaApi cloud.
pub struct MetaApiGateway {
    client: MetaApiClient,
    settings: MetaApiSettings,
}

impl MetaApiGateway {
    /// # Errors
    /// Returns an error if the REST client cannot be built.
    pub fn new(settings: MetaApiSettings) -> Result<Self> {
        Ok(Self {
            client: MetaApiClient::new(&settings)?,
            settings,
        })
    }

    /// Deploy the account if needed and wait until it is connected to its broker.
    async fn ensure_connected(&self, account: &AccountId) -> Result<Option<String>> {
        wait_connected(&self.client, &self.settings, account).await
    }
}

async fn wait_connected(
    client: &MetaApiClient,
    settings: &MetaApiSettings,
    account: &AccountId,
) -> Result<Option<String>> {
    let dto = client.account(account).await?;
    if !dto.is_deployed() {
        info!(account_id = %account, state = %dto.state, "Deploying account");
        client.deploy(account).await?;
    }
    if dto.is_connected() {
        return Ok(dto.name);
    }
    for attempt in 1..=settings.sync_retries {
        tokio::time::sleep(settings.sync_retry_delay).await;
        let dto = client.account(account).await?;
        if dto.is_connected() {
            return Ok(dto.name);
        }
        debug!(account_id = %account, attempt, "Waiting for broker connection");
    }
    Err(GatewayError::Timeout {
        what: format!("broker connection of account {account}"),
    }
    .into())
}

#[async_trait]
impl AccountGateway for MetaApiGateway {
    async fn connect(
        &self,
        key: &ParticipantKey,
        events: EventSink,
    ) -> Result<Arc<dyn AccountConnection>> {
        let name = self.ensure_connected(&key.account_id).await?;
        let connection = Arc::new(MetaApiConnection {
            key: key.clone(),
            client: self.client.clone(),
            settings: self.settings.clone(),
            name: RwLock::new(name),
            connected: AtomicBool::new(true),
            deal_poller: Mutex::new(None),
        });
        connection.start_deal_poller(events);
        info!(account_id = %key.account_id, group_id = %key.group_id, "Account connected");
        Ok(connection)
    }

    fn name(&self) -> &'static str {
        "metaapi"
    }
}

/// A connection to one MetaApi account.
///
/// Terminal state is read over REST on demand. New deals are discovered by a
/// background poller that publishes `DealAdded` events; the poller stops
/// when the connection is dropped.
pub struct MetaApiConnection {
    key: ParticipantKey,
    client: MetaApiClient,
    settings: MetaApiSettings,
    name: RwLock<Option<String>>,
    connected: AtomicBool,
    deal_poller: Mutex<Option<JoinHandle<()>>>,
}

impl MetaApiConnection {
    fn start_deal_poller(&self, events: EventSink) {
        let client = self.client.clone();
        let key = self.key.clone();
        let every = self.settings.deal_poll_interval;
        let limit = self.settings.deal_history_limit;

        let handle = tokio::spawn(async move {
            let mut cursor = Utc::now() - ChronoDuration::days(1);
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let deals = match client
                    .history_deals(&key.account_id, cursor, now, limit)
                    .await
                {
                    Ok(deals) => deals,
                    Err(e) => {
                        debug!(account_id = %key.account_id, error = %e, "Deal poll failed");
                        continue;
                    }
                };
                for deal in deals {
                    if deal.time > cursor {
                        cursor = deal.time;
                    }
                    let event =
                        AccountEvent::new(key.clone(), AccountEventKind::DealAdded { deal });
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });
        *self.deal_poller.lock() = Some(handle);
    }

    fn mark_stale_on<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transient() {
                self.connected.store(false, Ordering::SeqCst);
            }
        }
        result
    }
}

impl Drop for MetaApiConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.deal_poller.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl AccountConnection for MetaApiConnection {
    fn key(&self) -> &ParticipantKey {
        &self.key
    }

    fn account_name(&self) -> Option<String> {
        self.name.read().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<()> {
        let name = wait_connected(&self.client, &self.settings, &self.key.account_id).await?;
        if name.is_some() {
            *self.name.write() = name;
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn terminal_state(&self) -> Result<TerminalState> {
        let account = &self.key.account_id;
        let result = tokio::try_join!(
            self.client.account_information(account),
            self.client.positions(account),
            self.client.orders(account),
        );
        let (account_information, positions, orders) = self.mark_stale_on(result)?;
        Ok(TerminalState {
            account_information,
            positions,
            orders,
        })
    }

    async fn close_position(&self, id: &PositionId) -> Result<()> {
        let request = TradeRequest::ClosePosition {
            position_id: id.to_string(),
        };
        let result = self.client.trade(&self.key.account_id, &request).await;
        if let Err(e) = &result {
            warn!(account_id = %self.key.account_id, position_id = %id, error = %e, "Close position failed");
        }
        self.mark_stale_on(result)
    }

    async fn cancel_order(&self, id: &OrderId) -> Result<()> {
        let request = TradeRequest::CancelOrder {
            order_id: id.to_string(),
        };
        let result = self.client.trade(&self.key.account_id, &request).await;
        if let Err(e) = &result {
            warn!(account_id = %self.key.account_id, order_id = %id, error = %e, "Cancel order failed");
        }
        self.mark_stale_on(result)
    }
}
