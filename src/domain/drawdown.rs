//! Drawdown policy.
//!
//! Drawdown is the percentage loss of current equity relative to the
//! account's own tracked baseline. The baseline is reset to current equity
//! every time a freeze is released.

use rust_decimal::Decimal;

use super::group::Group;
use super::participant::Participant;

/// Result of evaluating a participant against its group's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breach {
    pub drawdown: Decimal,
    pub threshold: Decimal,
}

/// Stateless drawdown evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawdownPolicy;

impl DrawdownPolicy {
    /// Percentage drawdown of `equity` below `baseline`, floored at zero.
    #[must_use]
    pub fn drawdown(baseline: Decimal, equity: Decimal) -> Decimal {
        if baseline <= Decimal::ZERO || equity >= baseline {
            return Decimal::ZERO;
        }
        (baseline - equity) / baseline * Decimal::ONE_HUNDRED
    }

    /// Check the participant against the group's freeze threshold.
    #[must_use]
    pub fn evaluate(group: &Group, participant: &Participant) -> Option<Breach> {
        if !group.freezing_enabled() {
            return None;
        }
        let drawdown = Self::drawdown(participant.initial_balance, participant.equity);
        (drawdown >= group.freeze_threshold).then_some(Breach {
            drawdown,
            threshold: group.freeze_threshold,
        })
    }
}
