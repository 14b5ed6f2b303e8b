//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! # Available Ports
//!
//! - [`AccountGateway`], [`AccountConnection`] - Broker connectivity
//! - [`TrackerApi`] - External drawdown trackers
//! - [`Repository`] - Persistence for groups, participants, deals and freezes
//! - [`Notifier`] - Freeze lifecycle notifications

mod gateway;
mod notifier;
mod repository;

pub use gateway::{
    AccountConnection, AccountGateway, EventSink, NoopTrackerApi, TrackerApi, TrackerPeriod,
    TrackerSpec,
};
pub use notifier::{Event, Notifier};
pub use repository::Repository;
