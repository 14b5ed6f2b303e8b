//! MetaApi risk-management trackers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::MetaApiClient;
use super::dto::{NewTrackerDto, TrackerEventDto};
use crate::domain::{AccountEvent, AccountEventKind, AccountId, ParticipantKey, TrackerId};
use crate::error::Result;
use crate::port::{EventSink, TrackerApi, TrackerSpec};

/// Tracker API backed by the MetaApi risk-management service.
///
/// Trackers are named `"<accountId>:<groupId>"`; the name is how an event
/// is routed back to a participant.
pub struct MetaApiTrackerApi {
    client: MetaApiClient,
    routes: DashMap<TrackerId, ParticipantKey>,
}

impl MetaApiTrackerApi {
    #[must_use]
    pub fn new(client: MetaApiClient) -> Self {
        Self {
            client,
            routes: DashMap::new(),
        }
    }

    async fn route(&self, event: &TrackerEventDto) -> Option<ParticipantKey> {
        if let Some(key) = self.routes.get(&event.tracker_id) {
            return Some(key.clone());
        }
        let tracker = match self.client.tracker(&event.account_id, &event.tracker_id).await {
            Ok(tracker) => tracker,
            Err(e) => {
                warn!(tracker_id = %event.tracker_id, error = %e, "Tracker lookup failed");
                return None;
            }
        };
        let key = ParticipantKey::from_tracker_name(&tracker.name)?;
        self.routes.insert(event.tracker_id.clone(), key.clone());
        Some(key)
    }

    /// Long-poll tracker events and publish drawdown breaches on `events`.
    pub fn spawn_event_pump(self: &Arc<Self>, events: EventSink, idle: Duration) -> JoinHandle<()> {
        let api = Arc::clone(self);
        tokio::spawn(async move {
            let mut last_sequence = None;
            loop {
                let batch = match api.client.tracker_events(last_sequence).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        debug!(error = %e, "Tracker event poll failed");
                        tokio::time::sleep(idle).await;
                        continue;
                    }
                };
                if batch.is_empty() {
                    tokio::time::sleep(idle).await;
                }
                for event in batch {
                    last_sequence = Some(event.sequence_number);
                    if event.exceeded_threshold_type != "drawdown" {
                        continue;
                    }
                    let Some(key) = api.route(&event).await else {
                        warn!(tracker_id = %event.tracker_id, "Unroutable tracker event");
                        continue;
                    };
                    let kind = AccountEventKind::DrawdownExceeded {
                        tracker_id: event.tracker_id,
                        relative_drawdown: event.relative_drawdown.unwrap_or_default(),
                    };
                    if events.send(AccountEvent::new(key, kind)).await.is_err() {
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl TrackerApi for MetaApiTrackerApi {
    async fn create_tracker(&self, account: &AccountId, spec: &TrackerSpec) -> Result<TrackerId> {
        let body = NewTrackerDto {
            name: &spec.name,
            period: spec.period.as_str(),
            relative_drawdown_threshold: spec.threshold_percent / Decimal::ONE_HUNDRED,
        };
        let id = self.client.create_tracker(account, &body).await?;
        if let Some(key) = ParticipantKey::from_tracker_name(&spec.name) {
            self.routes.insert(id.clone(), key);
        }
        Ok(id)
    }

    async fn remove_tracker(&self, account: &AccountId, tracker: &TrackerId) -> Result<()> {
        self.routes.remove(tracker);
        self.client.delete_tracker(account, tracker).await
    }
}
