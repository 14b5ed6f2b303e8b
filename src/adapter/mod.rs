//! Adapters implementing the ports.
//!
//! - [`memory`] / [`sqlite`] - [`Repository`](crate::port::Repository) backends
//! - [`paper`] - Simulated broker gateway
//! - [`metaapi`] - MetaApi cloud gateway and trackers (requires `metaapi` feature)
//! - [`notifier`] - Notification backends

pub mod memory;
pub mod notifier;
pub mod paper;
pub mod sqlite;

#[cfg(feature = "metaapi")]
pub mod metaapi;
