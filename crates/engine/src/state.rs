//! Per-bet state machine
//!
//! ```text
//! Created -> FundsReserved -> OutcomeComputed -> Settled
//!    |             |                 |
//!    v             +-------+---------+
//! Rejected                 v
//!                        Failed
//! ```

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WagerState {
    Created,
    FundsReserved,
    OutcomeComputed,
    Settled,
    Rejected,
    Failed,
}

impl WagerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Rejected | Self::Failed)
    }

    /// Whether the stake has left the balance and must come back on failure
    pub fn holds_funds(&self) -> bool {
        matches!(self, Self::FundsReserved | Self::OutcomeComputed)
    }

    pub fn can_transition_to(&self, next: WagerState) -> bool {
        use WagerState::*;
        matches!(
            (self, next),
            (Created, FundsReserved)
                | (Created, Rejected)
                | (Created, Failed)
                | (FundsReserved, OutcomeComputed)
                | (FundsReserved, Failed)
                | (OutcomeComputed, Settled)
                | (OutcomeComputed, Failed)
        )
    }

    /// Move to `next`, refusing transitions the machine does not allow
    pub fn advance(&mut self, next: WagerState) -> Result<(), EngineError> {
        if !self.can_transition_to(next) {
            return Err(EngineError::IllegalTransition { from: *self, to: next });
        }
        tracing::trace!(from = %self, to = %next, "Wager state transition");
        *self = next;
        Ok(())
    }
}
