//! Persisted records shared by the stores and the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

use crate::amount::Amount;
use crate::ids::{BetId, RoundId, TxHash, UserKey};

/// A user's balance account.
///
/// `balance` never goes below zero and every mutation bumps `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_key: UserKey,
    pub balance: Amount,
    pub version: u64,
    /// Last bet nonce handed out for this account
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_key: UserKey) -> Self {
        let now = Utc::now();
        Self {
            user_key,
            balance: Amount::ZERO,
            version: 0,
            nonce: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Server seed commitment for one round.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCommitment {
    pub round_id: RoundId,
    /// Secret until `revealed`
    pub server_seed: String,
    pub server_seed_hash: String,
    pub revealed: bool,
    /// User the round was published to, if any
    pub owner: Option<UserKey>,
    /// Bet that consumed the round
    pub claimed_by: Option<BetId>,
    pub committed_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

impl SeedCommitment {
    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }
}

// Keeps unrevealed seeds out of logs.
impl fmt::Debug for SeedCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seed = if self.revealed {
            self.server_seed.as_str()
        } else {
            "<sealed>"
        };
        f.debug_struct("SeedCommitment")
            .field("round_id", &self.round_id)
            .field("server_seed", &seed)
            .field("server_seed_hash", &self.server_seed_hash)
            .field("revealed", &self.revealed)
            .field("owner", &self.owner)
            .field("claimed_by", &self.claimed_by)
            .field("committed_at", &self.committed_at)
            .field("revealed_at", &self.revealed_at)
            .finish()
    }
}

/// Lifecycle of a stored bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    /// Accepted, not yet resolved
    Pending,
    /// Outcome recorded and payout applied; immutable from here on
    Settled,
    /// Refunded after a failure; immutable from here on
    Failed,
}

impl BetStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A single dice bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub bet_id: BetId,
    pub user_key: UserKey,
    pub stake: Amount,
    pub prediction: u8,
    pub client_seed: String,
    pub nonce: u64,
    pub round_id: Option<RoundId>,
    pub server_seed_hash: Option<String>,
    pub outcome: Option<u8>,
    pub payout: Amount,
    pub status: BetStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl BetRecord {
    pub fn new(bet_id: BetId, user_key: UserKey, stake: Amount, prediction: u8, client_seed: String) -> Self {
        Self {
            bet_id,
            user_key,
            stake,
            prediction,
            client_seed,
            nonce: 0,
            round_id: None,
            server_seed_hash: None,
            outcome: None,
            payout: Amount::ZERO,
            status: BetStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    pub fn is_win(&self) -> bool {
        self.status == BetStatus::Settled && self.outcome == Some(self.prediction)
    }
}

/// An on-chain deposit seen through the webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub tx_hash: TxHash,
    pub user_key: UserKey,
    pub amount: Amount,
    pub confirmations: u32,
    pub first_seen_at: DateTime<Utc>,
    /// Set once the deposit has been credited
    pub processed_at: Option<DateTime<Utc>>,
}

impl DepositEvent {
    pub fn new(tx_hash: TxHash, user_key: UserKey, amount: Amount, confirmations: u32) -> Self {
        Self {
            tx_hash,
            user_key,
            amount,
            confirmations,
            first_seen_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Direction of a balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Debit,
    Credit,
}

/// One applied balance mutation, keyed for idempotency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOp {
    pub key: String,
    pub user_key: UserKey,
    pub kind: OpKind,
    pub amount: Amount,
    pub balance_after: Amount,
    /// Account version after the mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

/// Idempotency key namespaces for balance mutations
pub mod op_key {
    use crate::ids::{BetId, TxHash};

    pub fn stake(bet_id: &BetId) -> String {
        format!("{bet_id}:stake")
    }

    pub fn payout(bet_id: &BetId) -> String {
        bet_id.to_string()
    }

    pub fn refund(bet_id: &BetId) -> String {
        format!("{bet_id}:refund")
    }

    pub fn deposit(tx_hash: &TxHash) -> String {
        format!("deposit:{tx_hash}")
    }
}
