//! Store traits
//!
//! Every method is atomic on its own: it either applies completely or
//! leaves storage untouched. Balance mutations are serialized per user
//! key; different accounts proceed independently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dicebank_core::{
    Account, Amount, BetId, BetRecord, DepositEvent, LedgerOp, RoundId, SeedCommitment, TxHash,
    UserKey,
};

use crate::error::StoreResult;

/// Result of an applied (or replayed) balance mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReceipt {
    pub op: LedgerOp,
    /// True when the key had already been applied and nothing changed
    pub replayed: bool,
}

impl OpReceipt {
    pub fn balance_after(&self) -> Amount {
        self.op.balance_after
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited(OpReceipt),
    /// Not an error: the account simply cannot cover the amount
    InsufficientFunds { available: Amount },
}

/// Result of a credit that may not coexist with a rival key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusiveCredit {
    Credited(OpReceipt),
    /// The rival key was applied first; nothing changed
    Blocked(LedgerOp),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    Revealed(SeedCommitment),
    UnknownRound,
    AlreadyRevealed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositApplied {
    Credited(OpReceipt),
    AlreadyProcessed { processed_at: DateTime<Utc> },
}

/// Balance store: per-user balances with atomic debit and idempotent credit.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account, creating an empty one on first reference
    async fn account(&self, user: &UserKey) -> StoreResult<Account>;

    /// Check `balance >= amount` and deduct in one step.
    ///
    /// Replaying a key that was already applied returns the original receipt.
    async fn reserve_and_debit(
        &self,
        user: &UserKey,
        amount: Amount,
        key: &str,
    ) -> StoreResult<DebitOutcome>;

    /// Add `amount` once per idempotency key.
    async fn credit(&self, user: &UserKey, amount: Amount, key: &str) -> StoreResult<OpReceipt>;

    /// Add `amount` under `key` unless `rival` was already applied.
    ///
    /// The check and the credit are one step, so of two keys that name
    /// each other as rivals at most one is ever applied. Replaying an
    /// applied `key` returns its receipt.
    async fn credit_unless(
        &self,
        user: &UserKey,
        amount: Amount,
        key: &str,
        rival: &str,
    ) -> StoreResult<ExclusiveCredit>;

    /// Look up an applied operation by key
    async fn find_op(&self, key: &str) -> StoreResult<Option<LedgerOp>>;

    /// Most recent operations for a user, newest first
    async fn history(&self, user: &UserKey, limit: usize) -> StoreResult<Vec<LedgerOp>>;

    /// Allocate the next bet nonce for a user
    async fn next_nonce(&self, user: &UserKey) -> StoreResult<u64>;
}

/// Append-only seed commitments
#[async_trait]
pub trait SeedStore: Send + Sync {
    /// Fails with `Duplicate` if the round id exists
    async fn insert_commitment(&self, commitment: &SeedCommitment) -> StoreResult<()>;

    async fn commitment(&self, round: &RoundId) -> StoreResult<Option<SeedCommitment>>;

    /// Flip `revealed` exactly once
    async fn mark_revealed(&self, round: &RoundId) -> StoreResult<RevealOutcome>;

    /// Assign the user's oldest unclaimed round to a bet
    async fn claim_round(&self, user: &UserKey, bet: &BetId) -> StoreResult<Option<SeedCommitment>>;

    /// The user's oldest unclaimed round, without claiming it
    async fn open_round(&self, user: &UserKey) -> StoreResult<Option<SeedCommitment>>;
}

#[async_trait]
pub trait BetStore: Send + Sync {
    async fn insert_bet(&self, bet: &BetRecord) -> StoreResult<()>;

    /// Replace a pending bet record; settled and failed bets cannot be changed
    async fn update_bet(&self, bet: &BetRecord) -> StoreResult<()>;

    /// Remove a pending bet that never reserved funds
    async fn discard_bet(&self, bet: &BetId) -> StoreResult<()>;

    async fn bet(&self, bet: &BetId) -> StoreResult<Option<BetRecord>>;

    /// Bets of one user, newest first
    async fn bets_for_user(&self, user: &UserKey, limit: Option<usize>) -> StoreResult<Vec<BetRecord>>;

    /// Pending bets created at or before `before`
    async fn pending_bets(&self, before: DateTime<Utc>) -> StoreResult<Vec<BetRecord>>;
}

#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Credit a deposit and mark its hash processed in one unit
    async fn apply_deposit(&self, deposit: &DepositEvent) -> StoreResult<DepositApplied>;

    /// Remember an under-confirmed deposit without touching the balance
    async fn record_sighting(&self, deposit: &DepositEvent) -> StoreResult<()>;

    async fn deposit(&self, tx_hash: &TxHash) -> StoreResult<Option<DepositEvent>>;

    /// Sighted but not yet credited deposits of a user
    async fn pending_deposits(&self, user: &UserKey) -> StoreResult<Vec<DepositEvent>>;
}

/// Everything the engine needs from storage
pub trait LedgerStore: AccountStore + SeedStore + BetStore + DepositStore {}

impl<T> LedgerStore for T where T: AccountStore + SeedStore + BetStore + DepositStore {}
