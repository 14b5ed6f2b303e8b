//! MetaApi cloud brokerage adapter.
//!
//! - [`MetaApiGateway`] provisions accounts and hands out REST-backed connections.
//! - [`MetaApiTrackerApi`] manages drawdown trackers and pumps their events.

mod client;
mod dto;
mod gateway;
mod tracker;

use std::time::Duration;

pub use client::MetaApiClient;
pub use gateway::{MetaApiConnection, MetaApiGateway};
pub use tracker::MetaApiTrackerApi;

/// Runtime settings for the MetaApi adapter.
#[derive(Debug, Clone)]
pub struct MetaApiSettings {
    pub token: String,
    pub region: String,
    pub domain: String,
    pub request_timeout: Duration,
    pub sync_retries: u32,
    pub sync_retry_delay: Duration,
    pub deal_poll_interval: Duration,
    pub deal_history_limit: usize,
}
