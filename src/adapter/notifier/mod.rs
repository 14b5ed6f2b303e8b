//! Fan-out of freeze lifecycle events to notifier backends.

use tracing::{info, warn};

use crate::port::{Event, Notifier};

/// Ordered set of notifiers that every desk event is delivered to.
pub struct NotifierRegistry {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { notifiers: vec![] }
    }

    /// Registry that only writes events to the log.
    #[must_use]
    pub fn with_logging() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(LogNotifier));
        registry
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Deliver `event` to every notifier in registration order.
    pub fn notify_all(&self, event: Event) {
        for notifier in &self.notifiers {
            notifier.notify(event.clone());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Discards every event.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: Event) {}
}

/// Writes events as structured `tracing` records.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: Event) {
        match event {
            Event::AccountFrozen(record) => {
                warn!(
                    account_id = %record.account_id,
                    group_id = %record.group_id,
                    reason = %record.reason,
                    automated = record.automated,
                    release_time = %record.release_time,
                    "Account frozen"
                );
            }
            Event::AccountReleased {
                key,
                baseline,
                automatic,
            } => {
                info!(
                    account_id = %key.account_id,
                    group_id = %key.group_id,
                    baseline = %baseline,
                    automatic,
                    "Account released"
                );
            }
            Event::ParticipantEvicted { key, reason } => {
                warn!(
                    account_id = %key.account_id,
                    group_id = %key.group_id,
                    reason = %reason,
                    "Participant evicted"
                );
            }
            Event::RefreshFailed { cycle, error } => {
                warn!(cycle, error = %error, "Refresh failed");
            }
        }
    }
}
