//! Domain identifier types with proper encapsulation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new `", stringify!($name), "` from a string.")]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[doc = concat!("Create a `", stringify!($name), "`, rejecting blank input.")]
            pub fn try_new(id: impl Into<String>) -> Result<Self, DomainError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(DomainError::EmptyIdentifier { kind: $kind });
                }
                Ok(Self(id))
            }

            /// Get the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Brokerage account identifier; unique within a group.
    AccountId,
    "account"
);
string_id!(
    /// Competition group identifier.
    GroupId,
    "group"
);
string_id!(
    /// User profile identifier.
    UserId,
    "user"
);
string_id!(
    /// Broker deal identifier.
    DealId,
    "deal"
);
string_id!(
    /// Broker position identifier.
    PositionId,
    "position"
);
string_id!(
    /// Broker order identifier.
    OrderId,
    "order"
);
string_id!(
    /// External drawdown tracker handle.
    TrackerId,
    "tracker"
);

/// Unique identifier for a persisted freeze record.
///
/// Generated as UUID v4 for new freezes, or constructed from an existing
/// string when loaded from persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreezeId(String);

impl FreezeId {
    /// Create a new `FreezeId` with a generated UUID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the freeze ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FreezeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FreezeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FreezeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identity of a participant: one account enrolled in one group.
///
/// Every piece of per-account state in the cache, the freeze engine and the
/// timer registry is keyed by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantKey {
    pub group_id: GroupId,
    pub account_id: AccountId,
}

impl ParticipantKey {
    pub fn new(group_id: impl Into<GroupId>, account_id: impl Into<AccountId>) -> Self {
        Self {
            group_id: group_id.into(),
            account_id: account_id.into(),
        }
    }

    /// Name given to the external drawdown tracker for this participant.
    ///
    /// The broker-side tracker carries `"<accountId>:<groupId>"` so that a
    /// tracker event can be routed back without a lookup.
    #[must_use]
    pub fn tracker_name(&self) -> String {
        format!("{}:{}", self.account_id, self.group_id)
    }

    /// Parse a tracker name produced by [`tracker_name`](Self::tracker_name).
    #[must_use]
    pub fn from_tracker_name(name: &str) -> Option<Self> {
        let (account, group) = name.split_once(':')?;
        if account.is_empty() || group.is_empty() {
            return None;
        }
        Some(Self::new(group, account))
    }
}

impl fmt::Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.account_id, self.group_id)
    }
}
