//! Application services: the state cache, the freeze engine, event
//! listeners, and the [`Desk`] that composes them.

pub mod cache;
pub mod desk;
pub mod freeze;
pub mod listener;

use std::time::Duration;

use crate::port::TrackerPeriod;

pub use cache::{GroupView, StateCache};
pub use desk::{Desk, DeskHandle};
pub use freeze::{FreezeEngine, FreezeOutcome, RestoreReport};

/// Tunables shared by the cache, the refresh loops and the freeze engine.
#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub structural_refresh: Duration,
    pub trading_refresh: Duration,
    pub deal_history_limit: usize,
    pub queue_unknown_deals: bool,
    /// Freeze cool-down for groups that do not set one.
    pub default_freeze_duration: Duration,
    /// Liquidate new orders and positions that appear while frozen.
    pub enforce_while_frozen: bool,
    pub tracker_period: TrackerPeriod,
    pub event_buffer: usize,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            structural_refresh: Duration::from_secs(30),
            trading_refresh: Duration::from_millis(2000),
            deal_history_limit: 100,
            queue_unknown_deals: true,
            default_freeze_duration: Duration::from_secs(3600),
            enforce_while_frozen: true,
            tracker_period: TrackerPeriod::Lifetime,
            event_buffer: 1024,
        }
    }
}
