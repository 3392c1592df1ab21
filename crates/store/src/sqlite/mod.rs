//! Durable SQLite store
//!
//! Every mutation runs in one transaction whose first statement is a
//! write, so SQLite takes the write lock up front and the
//! read-check-write sequence inside cannot interleave with another writer.

mod schema;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dicebank_core::{
    op_key, Account, Amount, BetId, BetRecord, DepositEvent, LedgerOp, OpKind, RoundId,
    SeedCommitment, TxHash, UserKey,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    AccountStore, BetStore, DebitOutcome, DepositApplied, DepositStore, ExclusiveCredit, OpReceipt,
    RevealOutcome, SeedStore,
};
use schema::{to_db, AccountRow, BetRow, CommitmentRow, DepositRow, OpRow, SCHEMA};

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file and initialize the schema
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init().await?;
        tracing::debug!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Private in-memory database, mainly for tests
    pub async fn in_memory() -> StoreResult<Self> {
        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize the schema
    pub async fn init(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// --- balance helpers (run inside a transaction) ---

async fn ensure_account(conn: &mut SqliteConnection, user: &UserKey) -> StoreResult<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO accounts (user_key, balance, version, nonce, created_at, updated_at)
        VALUES (?, 0, 0, 0, ?, ?)
        ON CONFLICT(user_key) DO NOTHING
        "#,
    )
    .bind(user.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_account(conn: &mut SqliteConnection, user: &UserKey) -> StoreResult<Account> {
    sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE user_key = ?")
        .bind(user.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("account", user.as_str()))?
        .try_into()
}

async fn fetch_op(conn: &mut SqliteConnection, key: &str) -> StoreResult<Option<LedgerOp>> {
    sqlx::query_as::<_, OpRow>("SELECT * FROM ledger_ops WHERE op_key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?
        .map(LedgerOp::try_from)
        .transpose()
}

async fn apply_op(
    conn: &mut SqliteConnection,
    account: &Account,
    kind: OpKind,
    amount: Amount,
    balance_after: Amount,
    key: &str,
) -> StoreResult<LedgerOp> {
    let now = Utc::now();
    let version = account.version + 1;

    sqlx::query("UPDATE accounts SET balance = ?, version = ?, updated_at = ? WHERE user_key = ?")
        .bind(to_db(balance_after.minor(), "balance")?)
        .bind(to_db(version, "version")?)
        .bind(now)
        .bind(account.user_key.as_str())
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO ledger_ops (op_key, user_key, kind, amount, balance_after, version, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(key)
    .bind(account.user_key.as_str())
    .bind(kind.to_string())
    .bind(to_db(amount.minor(), "amount")?)
    .bind(to_db(balance_after.minor(), "balance")?)
    .bind(to_db(version, "version")?)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(LedgerOp {
        key: key.to_string(),
        user_key: account.user_key.clone(),
        kind,
        amount,
        balance_after,
        version,
        created_at: now,
    })
}

async fn credit_in(
    conn: &mut SqliteConnection,
    user: &UserKey,
    amount: Amount,
    key: &str,
) -> StoreResult<OpReceipt> {
    ensure_account(conn, user).await?;
    if let Some(op) = fetch_op(conn, key).await? {
        return Ok(OpReceipt { op, replayed: true });
    }

    let account = fetch_account(conn, user).await?;
    let balance_after = account
        .balance
        .checked_add(amount)
        .ok_or_else(|| StoreError::Overflow(user.to_string()))?;
    let op = apply_op(conn, &account, OpKind::Credit, amount, balance_after, key).await?;
    Ok(OpReceipt { op, replayed: false })
}

async fn fetch_commitment(
    conn: &mut SqliteConnection,
    round: &str,
) -> StoreResult<Option<SeedCommitment>> {
    Ok(
        sqlx::query_as::<_, CommitmentRow>("SELECT * FROM seed_commitments WHERE round_id = ?")
            .bind(round)
            .fetch_optional(&mut *conn)
            .await?
            .map(SeedCommitment::from),
    )
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn account(&self, user: &UserKey) -> StoreResult<Account> {
        let mut tx = self.pool.begin().await?;
        ensure_account(&mut tx, user).await?;
        let account = fetch_account(&mut tx, user).await?;
        tx.commit().await?;
        Ok(account)
    }

    async fn reserve_and_debit(
        &self,
        user: &UserKey,
        amount: Amount,
        key: &str,
    ) -> StoreResult<DebitOutcome> {
        let mut tx = self.pool.begin().await?;
        ensure_account(&mut tx, user).await?;

        if let Some(op) = fetch_op(&mut tx, key).await? {
            tx.commit().await?;
            return Ok(DebitOutcome::Debited(OpReceipt { op, replayed: true }));
        }

        let account = fetch_account(&mut tx, user).await?;
        let Some(balance_after) = account.balance.checked_sub(amount) else {
            tx.commit().await?;
            return Ok(DebitOutcome::InsufficientFunds {
                available: account.balance,
            });
        };

        let op = apply_op(&mut tx, &account, OpKind::Debit, amount, balance_after, key).await?;
        tx.commit().await?;
        Ok(DebitOutcome::Debited(OpReceipt { op, replayed: false }))
    }

    async fn credit(&self, user: &UserKey, amount: Amount, key: &str) -> StoreResult<OpReceipt> {
        let mut tx = self.pool.begin().await?;
        let receipt = credit_in(&mut tx, user, amount, key).await?;
        tx.commit().await?;
        Ok(receipt)
    }

    async fn credit_unless(
        &self,
        user: &UserKey,
        amount: Amount,
        key: &str,
        rival: &str,
    ) -> StoreResult<ExclusiveCredit> {
        let mut tx = self.pool.begin().await?;
        ensure_account(&mut tx, user).await?;

        if fetch_op(&mut tx, key).await?.is_none() {
            if let Some(blocker) = fetch_op(&mut tx, rival).await? {
                tx.commit().await?;
                return Ok(ExclusiveCredit::Blocked(blocker));
            }
        }

        let receipt = credit_in(&mut tx, user, amount, key).await?;
        tx.commit().await?;
        Ok(ExclusiveCredit::Credited(receipt))
    }

    async fn find_op(&self, key: &str) -> StoreResult<Option<LedgerOp>> {
        let mut conn = self.pool.acquire().await?;
        fetch_op(&mut conn, key).await
    }

    async fn history(&self, user: &UserKey, limit: usize) -> StoreResult<Vec<LedgerOp>> {
        sqlx::query_as::<_, OpRow>(
            "SELECT * FROM ledger_ops WHERE user_key = ? ORDER BY version DESC LIMIT ?",
        )
        .bind(user.as_str())
        .bind(to_db(limit as u64, "limit")?)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LedgerOp::try_from)
        .collect()
    }

    async fn next_nonce(&self, user: &UserKey) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        ensure_account(&mut tx, user).await?;
        sqlx::query(
            "UPDATE accounts SET nonce = nonce + 1, version = version + 1, updated_at = ? WHERE user_key = ?",
        )
        .bind(Utc::now())
        .bind(user.as_str())
        .execute(&mut *tx)
        .await?;
        let account = fetch_account(&mut tx, user).await?;
        tx.commit().await?;
        Ok(account.nonce)
    }
}

#[async_trait]
impl SeedStore for SqliteStore {
    async fn insert_commitment(&self, commitment: &SeedCommitment) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO seed_commitments
                (round_id, server_seed, server_seed_hash, revealed, owner, claimed_by, committed_at, revealed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(round_id) DO NOTHING
            "#,
        )
        .bind(commitment.round_id.as_str())
        .bind(&commitment.server_seed)
        .bind(&commitment.server_seed_hash)
        .bind(commitment.revealed)
        .bind(commitment.owner.as_ref().map(|o| o.as_str()))
        .bind(commitment.claimed_by.as_ref().map(|b| b.as_str()))
        .bind(commitment.committed_at)
        .bind(commitment.revealed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate("round", commitment.round_id.as_str()));
        }
        Ok(())
    }

    async fn commitment(&self, round: &RoundId) -> StoreResult<Option<SeedCommitment>> {
        let mut conn = self.pool.acquire().await?;
        fetch_commitment(&mut conn, round.as_str()).await
    }

    async fn mark_revealed(&self, round: &RoundId) -> StoreResult<RevealOutcome> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE seed_commitments SET revealed = 1, revealed_at = ? WHERE round_id = ? AND revealed = 0",
        )
        .bind(Utc::now())
        .bind(round.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let current = fetch_commitment(&mut tx, round.as_str()).await?;
        tx.commit().await?;

        Ok(match (updated, current) {
            (_, None) => RevealOutcome::UnknownRound,
            (1, Some(commitment)) => RevealOutcome::Revealed(commitment),
            (_, Some(_)) => RevealOutcome::AlreadyRevealed,
        })
    }

    async fn claim_round(&self, user: &UserKey, bet: &BetId) -> StoreResult<Option<SeedCommitment>> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            r#"
            UPDATE seed_commitments SET claimed_by = ?
            WHERE round_id = (
                SELECT round_id FROM seed_commitments
                WHERE owner = ? AND claimed_by IS NULL AND revealed = 0
                ORDER BY committed_at, round_id
                LIMIT 1
            )
            "#,
        )
        .bind(bet.as_str())
        .bind(user.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.commit().await?;
            return Ok(None);
        }

        let commitment = sqlx::query_as::<_, CommitmentRow>(
            "SELECT * FROM seed_commitments WHERE claimed_by = ?",
        )
        .bind(bet.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(SeedCommitment::from);
        tx.commit().await?;
        Ok(commitment)
    }

    async fn open_round(&self, user: &UserKey) -> StoreResult<Option<SeedCommitment>> {
        Ok(sqlx::query_as::<_, CommitmentRow>(
            r#"
            SELECT * FROM seed_commitments
            WHERE owner = ? AND claimed_by IS NULL AND revealed = 0
            ORDER BY committed_at, round_id
            LIMIT 1
            "#,
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(SeedCommitment::from))
    }
}

#[async_trait]
impl BetStore for SqliteStore {
    async fn insert_bet(&self, bet: &BetRecord) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO bets
                (bet_id, user_key, stake, prediction, client_seed, nonce, round_id,
                 server_seed_hash, outcome, payout, status, failure_reason, created_at, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bet_id) DO NOTHING
            "#,
        )
        .bind(bet.bet_id.as_str())
        .bind(bet.user_key.as_str())
        .bind(to_db(bet.stake.minor(), "stake")?)
        .bind(i64::from(bet.prediction))
        .bind(&bet.client_seed)
        .bind(to_db(bet.nonce, "nonce")?)
        .bind(bet.round_id.as_ref().map(|r| r.as_str()))
        .bind(bet.server_seed_hash.as_deref())
        .bind(bet.outcome.map(i64::from))
        .bind(to_db(bet.payout.minor(), "payout")?)
        .bind(bet.status.to_string())
        .bind(bet.failure_reason.as_deref())
        .bind(bet.created_at)
        .bind(bet.resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate("bet", bet.bet_id.as_str()));
        }
        Ok(())
    }

    async fn update_bet(&self, bet: &BetRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE bets SET
                stake = ?, prediction = ?, client_seed = ?, nonce = ?, round_id = ?,
                server_seed_hash = ?, outcome = ?, payout = ?, status = ?,
                failure_reason = ?, resolved_at = ?
            WHERE bet_id = ? AND status = 'pending'
            "#,
        )
        .bind(to_db(bet.stake.minor(), "stake")?)
        .bind(i64::from(bet.prediction))
        .bind(&bet.client_seed)
        .bind(to_db(bet.nonce, "nonce")?)
        .bind(bet.round_id.as_ref().map(|r| r.as_str()))
        .bind(bet.server_seed_hash.as_deref())
        .bind(bet.outcome.map(i64::from))
        .bind(to_db(bet.payout.minor(), "payout")?)
        .bind(bet.status.to_string())
        .bind(bet.failure_reason.as_deref())
        .bind(bet.resolved_at)
        .bind(bet.bet_id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT status FROM bets WHERE bet_id = ?")
                .bind(bet.bet_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Err(match exists {
                Some((status,)) => StoreError::Immutable(format!("bet {} is {status}", bet.bet_id)),
                None => StoreError::not_found("bet", bet.bet_id.as_str()),
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn discard_bet(&self, bet: &BetId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM bets WHERE bet_id = ? AND status = 'pending'")
            .bind(bet.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT status FROM bets WHERE bet_id = ?")
                .bind(bet.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_some() {
                tx.rollback().await?;
                return Err(StoreError::Immutable(format!("bet {bet} is resolved")));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn bet(&self, bet: &BetId) -> StoreResult<Option<BetRecord>> {
        sqlx::query_as::<_, BetRow>("SELECT * FROM bets WHERE bet_id = ?")
            .bind(bet.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(BetRecord::try_from)
            .transpose()
    }

    async fn bets_for_user(&self, user: &UserKey, limit: Option<usize>) -> StoreResult<Vec<BetRecord>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = match limit {
            Some(limit) => to_db(limit as u64, "limit")?,
            None => -1,
        };
        sqlx::query_as::<_, BetRow>(
            "SELECT * FROM bets WHERE user_key = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(BetRecord::try_from)
        .collect()
    }

    async fn pending_bets(&self, before: DateTime<Utc>) -> StoreResult<Vec<BetRecord>> {
        sqlx::query_as::<_, BetRow>(
            "SELECT * FROM bets WHERE status = 'pending' AND created_at <= ? ORDER BY created_at",
        )
        .bind(before)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(BetRecord::try_from)
        .collect()
    }
}

#[async_trait]
impl DepositStore for SqliteStore {
    async fn apply_deposit(&self, deposit: &DepositEvent) -> StoreResult<DepositApplied> {
        let mut tx = self.pool.begin().await?;
        ensure_account(&mut tx, &deposit.user_key).await?;

        let existing = sqlx::query_as::<_, DepositRow>("SELECT * FROM deposits WHERE tx_hash = ?")
            .bind(deposit.tx_hash.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(processed_at) = existing.and_then(|row| row.processed_at) {
            tx.commit().await?;
            return Ok(DepositApplied::AlreadyProcessed { processed_at });
        }

        let key = op_key::deposit(&deposit.tx_hash);
        let receipt = credit_in(&mut tx, &deposit.user_key, deposit.amount, &key).await?;

        sqlx::query(
            r#"
            INSERT INTO deposits (tx_hash, user_key, amount, confirmations, first_seen_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash) DO UPDATE SET
                user_key = excluded.user_key,
                amount = excluded.amount,
                confirmations = excluded.confirmations,
                processed_at = excluded.processed_at
            "#,
        )
        .bind(deposit.tx_hash.as_str())
        .bind(deposit.user_key.as_str())
        .bind(to_db(deposit.amount.minor(), "amount")?)
        .bind(i64::from(deposit.confirmations))
        .bind(deposit.first_seen_at)
        .bind(receipt.op.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(DepositApplied::Credited(receipt))
    }

    async fn record_sighting(&self, deposit: &DepositEvent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deposits (tx_hash, user_key, amount, confirmations, first_seen_at, processed_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            ON CONFLICT(tx_hash) DO UPDATE SET
                confirmations = MAX(confirmations, excluded.confirmations)
            WHERE processed_at IS NULL
            "#,
        )
        .bind(deposit.tx_hash.as_str())
        .bind(deposit.user_key.as_str())
        .bind(to_db(deposit.amount.minor(), "amount")?)
        .bind(i64::from(deposit.confirmations))
        .bind(deposit.first_seen_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deposit(&self, tx_hash: &TxHash) -> StoreResult<Option<DepositEvent>> {
        sqlx::query_as::<_, DepositRow>("SELECT * FROM deposits WHERE tx_hash = ?")
            .bind(tx_hash.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(DepositEvent::try_from)
            .transpose()
    }

    async fn pending_deposits(&self, user: &UserKey) -> StoreResult<Vec<DepositEvent>> {
        sqlx::query_as::<_, DepositRow>(
            "SELECT * FROM deposits WHERE user_key = ? AND processed_at IS NULL ORDER BY first_seen_at",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DepositEvent::try_from)
        .collect()
    }
}
