//! Riskboard - trading-competition account tracking with drawdown freezes.
//!
//! Keeps an in-memory mirror of competition groups and their trading
//! accounts, ranks participants on a leaderboard, and freezes accounts whose
//! drawdown crosses their group's threshold: open orders are cancelled,
//! positions closed, and the account is released after a cool-down.
//!
//! # Modules
//!
//! - [`domain`] - Broker-agnostic types and pure logic (P&L, drawdown, ranking)
//! - [`port`] - Traits for brokers, trackers, persistence and notifications
//! - [`adapter`] - SQLite / in-memory persistence, MetaApi and paper gateways
//! - [`application`] - State cache, freeze engine, event listener, [`application::Desk`]
//! - [`app`] - Configuration and wiring
//! - [`cli`] - Command-line interface
//! - [`error`] - Error types for the crate
//!
//! # Features
//!
//! - `metaapi` - MetaApi cloud gateway and trackers (default)
//! - `testkit` - Builders and test doubles for integration tests

pub mod adapter;
pub mod app;
pub mod application;
pub mod cli;
pub mod domain;
pub mod error;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
