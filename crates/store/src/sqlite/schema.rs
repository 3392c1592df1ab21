//! SQLite schema and row mappings

use chrono::{DateTime, Utc};
use dicebank_core::{
    Account, Amount, BetId, BetRecord, BetStatus, DepositEvent, LedgerOp, OpKind, RoundId,
    SeedCommitment, TxHash, UserKey,
};
use std::str::FromStr;

use crate::error::{StoreError, StoreResult};

pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        user_key TEXT PRIMARY KEY,
        balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
        version INTEGER NOT NULL DEFAULT 0,
        nonce INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_ops (
        op_key TEXT PRIMARY KEY,
        user_key TEXT NOT NULL,
        kind TEXT NOT NULL,
        amount INTEGER NOT NULL,
        balance_after INTEGER NOT NULL,
        version INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_ops_user ON ledger_ops(user_key, version)",
    r#"
    CREATE TABLE IF NOT EXISTS seed_commitments (
        round_id TEXT PRIMARY KEY,
        server_seed TEXT NOT NULL,
        server_seed_hash TEXT NOT NULL,
        revealed INTEGER NOT NULL DEFAULT 0,
        owner TEXT,
        claimed_by TEXT,
        committed_at TEXT NOT NULL,
        revealed_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_seed_commitments_owner ON seed_commitments(owner, claimed_by)",
    r#"
    CREATE TABLE IF NOT EXISTS bets (
        bet_id TEXT PRIMARY KEY,
        user_key TEXT NOT NULL,
        stake INTEGER NOT NULL,
        prediction INTEGER NOT NULL,
        client_seed TEXT NOT NULL,
        nonce INTEGER NOT NULL,
        round_id TEXT,
        server_seed_hash TEXT,
        outcome INTEGER,
        payout INTEGER NOT NULL,
        status TEXT NOT NULL,
        failure_reason TEXT,
        created_at TEXT NOT NULL,
        resolved_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_bets_user ON bets(user_key, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS deposits (
        tx_hash TEXT PRIMARY KEY,
        user_key TEXT NOT NULL,
        amount INTEGER NOT NULL,
        confirmations INTEGER NOT NULL,
        first_seen_at TEXT NOT NULL,
        processed_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_deposits_user ON deposits(user_key, processed_at)",
];

pub(crate) fn to_db(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Overflow(format!("{what} = {value}")))
}

fn from_db(value: i64, what: &str) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {what}: {value}")))
}

fn small(value: i64, what: &str) -> StoreResult<u8> {
    u8::try_from(value).map_err(|_| StoreError::Corrupt(format!("{what} out of range: {value}")))
}

#[derive(Debug, sqlx::FromRow)]
pub struct AccountRow {
    pub user_key: String,
    pub balance: i64,
    pub version: i64,
    pub nonce: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> StoreResult<Self> {
        Ok(Account {
            user_key: UserKey::new(row.user_key),
            balance: Amount::from_minor(from_db(row.balance, "balance")?),
            version: from_db(row.version, "version")?,
            nonce: from_db(row.nonce, "nonce")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct OpRow {
    pub op_key: String,
    pub user_key: String,
    pub kind: String,
    pub amount: i64,
    pub balance_after: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<OpRow> for LedgerOp {
    type Error = StoreError;

    fn try_from(row: OpRow) -> StoreResult<Self> {
        Ok(LedgerOp {
            kind: OpKind::from_str(&row.kind)
                .map_err(|_| StoreError::Corrupt(format!("op kind {}", row.kind)))?,
            key: row.op_key,
            user_key: UserKey::new(row.user_key),
            amount: Amount::from_minor(from_db(row.amount, "amount")?),
            balance_after: Amount::from_minor(from_db(row.balance_after, "balance_after")?),
            version: from_db(row.version, "version")?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct CommitmentRow {
    pub round_id: String,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub revealed: bool,
    pub owner: Option<String>,
    pub claimed_by: Option<String>,
    pub committed_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

impl From<CommitmentRow> for SeedCommitment {
    fn from(row: CommitmentRow) -> Self {
        SeedCommitment {
            round_id: RoundId::new(row.round_id),
            server_seed: row.server_seed,
            server_seed_hash: row.server_seed_hash,
            revealed: row.revealed,
            owner: row.owner.map(UserKey::new),
            claimed_by: row.claimed_by.map(BetId::new),
            committed_at: row.committed_at,
            revealed_at: row.revealed_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct BetRow {
    pub bet_id: String,
    pub user_key: String,
    pub stake: i64,
    pub prediction: i64,
    pub client_seed: String,
    pub nonce: i64,
    pub round_id: Option<String>,
    pub server_seed_hash: Option<String>,
    pub outcome: Option<i64>,
    pub payout: i64,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<BetRow> for BetRecord {
    type Error = StoreError;

    fn try_from(row: BetRow) -> StoreResult<Self> {
        Ok(BetRecord {
            status: BetStatus::from_str(&row.status)
                .map_err(|_| StoreError::Corrupt(format!("bet status {}", row.status)))?,
            bet_id: BetId::new(row.bet_id),
            user_key: UserKey::new(row.user_key),
            stake: Amount::from_minor(from_db(row.stake, "stake")?),
            prediction: small(row.prediction, "prediction")?,
            client_seed: row.client_seed,
            nonce: from_db(row.nonce, "nonce")?,
            round_id: row.round_id.map(RoundId::new),
            server_seed_hash: row.server_seed_hash,
            outcome: row.outcome.map(|o| small(o, "outcome")).transpose()?,
            payout: Amount::from_minor(from_db(row.payout, "payout")?),
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DepositRow {
    pub tx_hash: String,
    pub user_key: String,
    pub amount: i64,
    pub confirmations: i64,
    pub first_seen_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DepositRow> for DepositEvent {
    type Error = StoreError;

    fn try_from(row: DepositRow) -> StoreResult<Self> {
        Ok(DepositEvent {
            tx_hash: TxHash::new(row.tx_hash),
            user_key: UserKey::new(row.user_key),
            amount: Amount::from_minor(from_db(row.amount, "amount")?),
            confirmations: u32::try_from(row.confirmations).map_err(|_| {
                StoreError::Corrupt(format!("confirmations out of range: {}", row.confirmations))
            })?,
            first_seen_at: row.first_seen_at,
            processed_at: row.processed_at,
        })
    }
}
