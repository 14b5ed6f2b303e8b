//! Domain validation errors for core domain types.
//!
//! These errors are returned by `try_new` constructors and parsers that
//! validate domain rules before a value can enter the cache.

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Identifiers must not be blank.
    #[error("{kind} identifier cannot be empty")]
    EmptyIdentifier {
        /// Which identifier was blank.
        kind: &'static str,
    },

    /// Freeze thresholds are percentages and cannot be negative.
    #[error("freeze threshold must be non-negative, got {threshold}")]
    NegativeThreshold {
        /// The invalid threshold.
        threshold: rust_decimal::Decimal,
    },

    /// Initial balances cannot be negative.
    #[error("initial balance must be non-negative, got {balance}")]
    NegativeBalance {
        /// The invalid balance.
        balance: rust_decimal::Decimal,
    },

    /// Unknown participant status string.
    #[error("unknown participant status '{0}'")]
    UnknownStatus(String),
}
