//! Broker-agnostic domain types and pure logic.

pub mod drawdown;
pub mod error;
pub mod event;
pub mod freeze;
pub mod group;
pub mod id;
pub mod leaderboard;
pub mod participant;
pub mod trading;

pub use drawdown::{Breach, DrawdownPolicy};
pub use error::DomainError;
pub use event::{AccountEvent, AccountEventKind};
pub use freeze::{FreezeRecord, DRAWDOWN_REASON};
pub use group::Group;
pub use id::{
    AccountId, DealId, FreezeId, GroupId, OrderId, ParticipantKey, PositionId, TrackerId, UserId,
};
pub use leaderboard::{rank, LeaderboardEntry, LeaderboardSnapshot};
pub use participant::{Participant, ParticipantRecord, ParticipantStatus, UserProfile};
pub use trading::{AccountInformation, Deal, Order, Position, TerminalState};
