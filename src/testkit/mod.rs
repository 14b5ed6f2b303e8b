//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`domain`] - Builders for groups, participants, deals and freezes.
//! - [`tracker`] - [`RecordingTrackerApi`](tracker::RecordingTrackerApi).
//! - [`fixture`] - [`DeskFixture`](fixture::DeskFixture): a desk over an
//!   in-memory repository and the paper gateway.

pub mod domain;
pub mod fixture;
pub mod tracker;
