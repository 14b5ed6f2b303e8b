//! Live broker connections, created on first need and reused across cycles.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::domain::ParticipantKey;
use crate::error::Result;
use crate::port::{AccountConnection, AccountGateway, EventSink};

/// Registry of connections keyed by participant.
pub struct ConnectionRegistry {
    gateway: Arc<dyn AccountGateway>,
    sink: EventSink,
    connections: DashMap<ParticipantKey, Arc<dyn AccountConnection>>,
}

impl ConnectionRegistry {
    pub fn new(gateway: Arc<dyn AccountGateway>, sink: EventSink) -> Self {
        Self {
            gateway,
            sink,
            connections: DashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &ParticipantKey) -> Option<Arc<dyn AccountConnection>> {
        self.connections.get(key).map(|c| Arc::clone(c.value()))
    }

    /// Return a usable connection, reconnecting a stale one or opening a new one.
    ///
    /// A connection that cannot be re-established is dropped from the registry.
    pub async fn get_or_connect(&self, key: &ParticipantKey) -> Result<Arc<dyn AccountConnection>> {
        if let Some(existing) = self.get(key) {
            if existing.is_connected() {
                return Ok(existing);
            }
            debug!(account_id = %key.account_id, group_id = %key.group_id, "Reconnecting stale connection");
            return match existing.reconnect().await {
                Ok(()) => Ok(existing),
                Err(e) => {
                    self.connections.remove(key);
                    Err(e)
                }
            };
        }

        let connection = self.gateway.connect(key, self.sink.clone()).await?;
        info!(
            account_id = %key.account_id,
            group_id = %key.group_id,
            gateway = self.gateway.name(),
            "Connection established"
        );
        self.connections.insert(key.clone(), Arc::clone(&connection));
        Ok(connection)
    }

    /// Reconnect an existing connection if it went stale. Missing connections
    /// are left for the next refresh to open.
    pub async fn ensure_fresh(&self, key: &ParticipantKey) {
        let Some(existing) = self.get(key) else {
            return;
        };
        if existing.is_connected() {
            return;
        }
        if let Err(e) = existing.reconnect().await {
            warn!(account_id = %key.account_id, error = %e, "Reconnect failed");
        }
    }

    pub fn remove(&self, key: &ParticipantKey) -> bool {
        self.connections.remove(key).is_some()
    }

    /// Drop connections whose participant is no longer cached.
    pub fn retain(&self, keys: &HashSet<ParticipantKey>) -> usize {
        let before = self.connections.len();
        self.connections.retain(|k, _| keys.contains(k));
        before - self.connections.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
