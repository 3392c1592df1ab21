//! Engine error taxonomy
//!
//! Business outcomes (insufficient funds or confirmations, duplicate
//! deliveries) are not errors; they come back as `Ok` values carrying a
//! `Rejection` or an `AlreadyProcessed` variant.

use dicebank_core::{Amount, BetId, RoundId, UserKey};
use dicebank_fairness::FairnessError;
use dicebank_store::StoreError;
use thiserror::Error;

use crate::address::AddressError;
use crate::config::ConfigError;
use crate::state::WagerState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad bet input, correctable by the user
    #[error("Invalid wager: {0}")]
    InvalidWager(String),

    #[error("Invalid deposit: {0}")]
    InvalidDeposit(String),

    #[error("Unknown round: {0}")]
    UnknownRound(RoundId),

    #[error("Round already revealed: {0}")]
    AlreadyRevealed(RoundId),

    #[error("Round already committed: {0}")]
    DuplicateRound(RoundId),

    /// No round was committed for the user before the bet; retry
    #[error("No committed round for {0}")]
    NoCommittedRound(UserKey),

    #[error("Unknown bet: {0}")]
    UnknownBet(BetId),

    /// The stake was refunded while the bet was still settling
    #[error("Bet already refunded: {0}")]
    BetRefunded(BetId),

    #[error("Illegal wager transition: {from} -> {to}")]
    IllegalTransition { from: WagerState, to: WagerState },

    #[error("Deposit address unavailable: {0}")]
    Address(#[from] AddressError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fairness check failed: {0}")]
    Fairness(#[from] FairnessError),

    /// Storage or transport failure; retry, nothing was partially applied
    #[error("Storage unavailable: {0}")]
    Unavailable(#[source] StoreError),

    #[error("Storage invariant violated: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        if err.is_retryable() {
            Self::Unavailable(err)
        } else {
            Self::Storage(err)
        }
    }
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::NoCommittedRound(_))
    }

    /// Input problems the user can fix, as opposed to internal faults
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidWager(_) | Self::InvalidDeposit(_) | Self::UnknownBet(_))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidWager(_) => "INVALID_WAGER",
            Self::InvalidDeposit(_) => "INVALID_DEPOSIT",
            Self::UnknownRound(_) => "UNKNOWN_ROUND",
            Self::AlreadyRevealed(_) => "ALREADY_REVEALED",
            Self::DuplicateRound(_) => "DUPLICATE_ROUND",
            Self::NoCommittedRound(_) => "NO_COMMITTED_ROUND",
            Self::UnknownBet(_) => "UNKNOWN_BET",
            Self::BetRefunded(_) => "BET_REFUNDED",
            Self::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            Self::Address(_) => "ADDRESS_UNAVAILABLE",
            Self::Config(_) => "CONFIG",
            Self::Fairness(_) => "FAIRNESS_MISMATCH",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Storage(_) => "STORAGE",
        }
    }
}

/// Normal, non-error refusals
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    /// Retry once the transaction has more confirmations
    #[error("Insufficient confirmations: {have} of {need}")]
    InsufficientConfirmations { have: u32, need: u32 },
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InsufficientConfirmations { .. } => "INSUFFICIENT_CONFIRMATIONS",
        }
    }
}
