//! Notifier port for freeze lifecycle notifications.

use rust_decimal::Decimal;

use crate::domain::{FreezeRecord, ParticipantKey};

/// Events that can trigger notifications.
#[derive(Debug, Clone)]
pub enum Event {
    /// A participant was frozen.
    AccountFrozen(FreezeRecord),
    /// A participant's freeze ended.
    AccountReleased {
        key: ParticipantKey,
        /// Drawdown baseline after release.
        baseline: Decimal,
        /// Whether release came from the timer rather than an operator.
        automatic: bool,
    },
    /// A participant was dropped from the cache.
    ParticipantEvicted { key: ParticipantKey, reason: String },
    /// A refresh cycle failed and kept the previous snapshot.
    RefreshFailed { cycle: &'static str, error: String },
}

/// Trait for notification handlers.
pub trait Notifier: Send + Sync {
    /// Handle an event.
    fn notify(&self, event: Event);
}
