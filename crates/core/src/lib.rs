//! DiceBank Core - Domain types
//!
//! This crate contains the fundamental types used across DiceBank:
//! - `Amount`: Non-negative integer amount in minor units (lovelace)
//! - Typed string ids: `UserKey`, `RoundId`, `BetId`, `TxHash`
//! - Persisted records: accounts, seed commitments, bets, deposits, balance ops

pub mod amount;
pub mod ids;
pub mod records;

pub use amount::{Amount, AmountError, DECIMALS, UNIT};
pub use ids::{BetId, RoundId, TxHash, UserKey};
pub use records::{
    op_key, Account, BetRecord, BetStatus, DepositEvent, LedgerOp, OpKind, SeedCommitment,
};
