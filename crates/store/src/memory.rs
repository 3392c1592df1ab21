//! In-process store
//!
//! Each account sits behind its own async mutex; secondary indexes are
//! sharded `DashMap`s. Locks are always taken account first, then the
//! deposit index, then the op index, and no shard guard is held across
//! an await point.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dicebank_core::{
    op_key, Account, Amount, BetId, BetRecord, BetStatus, DepositEvent, LedgerOp, OpKind,
    RoundId, SeedCommitment, TxHash, UserKey,
};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::traits::{
    AccountStore, BetStore, DebitOutcome, DepositApplied, DepositStore, ExclusiveCredit, OpReceipt,
    RevealOutcome, SeedStore,
};

struct Slot {
    account: Account,
    ops: Vec<LedgerOp>,
}

impl Slot {
    fn apply(&mut self, kind: OpKind, amount: Amount, balance_after: Amount, key: &str) -> LedgerOp {
        let now = Utc::now();
        self.account.balance = balance_after;
        self.account.version += 1;
        self.account.updated_at = now;

        let op = LedgerOp {
            key: key.to_string(),
            user_key: self.account.user_key.clone(),
            kind,
            amount,
            balance_after,
            version: self.account.version,
            created_at: now,
        };
        self.ops.push(op.clone());
        op
    }
}

/// Non-durable store for tests and embedding
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<UserKey, Arc<Mutex<Slot>>>,
    ops: DashMap<String, LedgerOp>,
    rounds: DashMap<RoundId, SeedCommitment>,
    bets: DashMap<BetId, BetRecord>,
    deposits: DashMap<TxHash, DepositEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user: &UserKey) -> Arc<Mutex<Slot>> {
        self.accounts
            .entry(user.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Slot {
                    account: Account::new(user.clone()),
                    ops: Vec::new(),
                }))
            })
            .clone()
    }

    /// Credit while already holding the account lock
    fn credit_locked(&self, slot: &mut Slot, amount: Amount, key: &str) -> StoreResult<OpReceipt> {
        match self.ops.entry(key.to_string()) {
            Entry::Occupied(existing) => Ok(OpReceipt {
                op: existing.get().clone(),
                replayed: true,
            }),
            Entry::Vacant(vacant) => {
                let balance_after = slot
                    .account
                    .balance
                    .checked_add(amount)
                    .ok_or_else(|| StoreError::Overflow(slot.account.user_key.to_string()))?;
                let op = slot.apply(OpKind::Credit, amount, balance_after, key);
                vacant.insert(op.clone());
                Ok(OpReceipt { op, replayed: false })
            }
        }
    }

    fn unclaimed_rounds(&self, user: &UserKey) -> Vec<(DateTime<Utc>, RoundId)> {
        let mut candidates: Vec<_> = self
            .rounds
            .iter()
            .filter(|r| r.owner.as_ref() == Some(user) && !r.is_claimed() && !r.revealed)
            .map(|r| (r.committed_at, r.round_id.clone()))
            .collect();
        candidates.sort();
        candidates
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn account(&self, user: &UserKey) -> StoreResult<Account> {
        let slot = self.slot(user);
        let slot = slot.lock().await;
        Ok(slot.account.clone())
    }

    async fn reserve_and_debit(
        &self,
        user: &UserKey,
        amount: Amount,
        key: &str,
    ) -> StoreResult<DebitOutcome> {
        let slot = self.slot(user);
        let mut slot = slot.lock().await;

        match self.ops.entry(key.to_string()) {
            Entry::Occupied(existing) => Ok(DebitOutcome::Debited(OpReceipt {
                op: existing.get().clone(),
                replayed: true,
            })),
            Entry::Vacant(vacant) => {
                let Some(balance_after) = slot.account.balance.checked_sub(amount) else {
                    return Ok(DebitOutcome::InsufficientFunds {
                        available: slot.account.balance,
                    });
                };
                let op = slot.apply(OpKind::Debit, amount, balance_after, key);
                vacant.insert(op.clone());
                Ok(DebitOutcome::Debited(OpReceipt { op, replayed: false }))
            }
        }
    }

    async fn credit(&self, user: &UserKey, amount: Amount, key: &str) -> StoreResult<OpReceipt> {
        let slot = self.slot(user);
        let mut slot = slot.lock().await;
        self.credit_locked(&mut slot, amount, key)
    }

    async fn credit_unless(
        &self,
        user: &UserKey,
        amount: Amount,
        key: &str,
        rival: &str,
    ) -> StoreResult<ExclusiveCredit> {
        let slot = self.slot(user);
        let mut slot = slot.lock().await;

        // Rival keys belong to the same account, so its lock orders them
        if !self.ops.contains_key(key) {
            if let Some(blocker) = self.ops.get(rival).map(|op| op.value().clone()) {
                return Ok(ExclusiveCredit::Blocked(blocker));
            }
        }
        Ok(ExclusiveCredit::Credited(self.credit_locked(&mut slot, amount, key)?))
    }

    async fn find_op(&self, key: &str) -> StoreResult<Option<LedgerOp>> {
        Ok(self.ops.get(key).map(|op| op.value().clone()))
    }

    async fn history(&self, user: &UserKey, limit: usize) -> StoreResult<Vec<LedgerOp>> {
        let slot = self.slot(user);
        let slot = slot.lock().await;
        Ok(slot.ops.iter().rev().take(limit).cloned().collect())
    }

    async fn next_nonce(&self, user: &UserKey) -> StoreResult<u64> {
        let slot = self.slot(user);
        let mut slot = slot.lock().await;
        slot.account.nonce += 1;
        slot.account.version += 1;
        slot.account.updated_at = Utc::now();
        Ok(slot.account.nonce)
    }
}

#[async_trait]
impl SeedStore for MemoryStore {
    async fn insert_commitment(&self, commitment: &SeedCommitment) -> StoreResult<()> {
        match self.rounds.entry(commitment.round_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::duplicate(
                "round",
                commitment.round_id.to_string(),
            )),
            Entry::Vacant(vacant) => {
                vacant.insert(commitment.clone());
                Ok(())
            }
        }
    }

    async fn commitment(&self, round: &RoundId) -> StoreResult<Option<SeedCommitment>> {
        Ok(self.rounds.get(round).map(|r| r.value().clone()))
    }

    async fn mark_revealed(&self, round: &RoundId) -> StoreResult<RevealOutcome> {
        let Some(mut commitment) = self.rounds.get_mut(round) else {
            return Ok(RevealOutcome::UnknownRound);
        };
        if commitment.revealed {
            return Ok(RevealOutcome::AlreadyRevealed);
        }
        commitment.revealed = true;
        commitment.revealed_at = Some(Utc::now());
        Ok(RevealOutcome::Revealed(commitment.clone()))
    }

    async fn claim_round(&self, user: &UserKey, bet: &BetId) -> StoreResult<Option<SeedCommitment>> {
        for (_, round_id) in self.unclaimed_rounds(user) {
            if let Some(mut commitment) = self.rounds.get_mut(&round_id) {
                // Another bet may have claimed it since the scan
                if commitment.is_claimed() || commitment.revealed {
                    continue;
                }
                commitment.claimed_by = Some(bet.clone());
                return Ok(Some(commitment.clone()));
            }
        }
        Ok(None)
    }

    async fn open_round(&self, user: &UserKey) -> StoreResult<Option<SeedCommitment>> {
        Ok(self
            .unclaimed_rounds(user)
            .into_iter()
            .find_map(|(_, round_id)| self.rounds.get(&round_id).map(|r| r.value().clone())))
    }
}

#[async_trait]
impl BetStore for MemoryStore {
    async fn insert_bet(&self, bet: &BetRecord) -> StoreResult<()> {
        match self.bets.entry(bet.bet_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::duplicate("bet", bet.bet_id.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(bet.clone());
                Ok(())
            }
        }
    }

    async fn update_bet(&self, bet: &BetRecord) -> StoreResult<()> {
        let Some(mut existing) = self.bets.get_mut(&bet.bet_id) else {
            return Err(StoreError::not_found("bet", bet.bet_id.to_string()));
        };
        if existing.status.is_resolved() {
            return Err(StoreError::Immutable(format!(
                "bet {} is {}",
                bet.bet_id, existing.status
            )));
        }
        *existing = bet.clone();
        Ok(())
    }

    async fn discard_bet(&self, bet: &BetId) -> StoreResult<()> {
        match self.bets.entry(bet.clone()) {
            Entry::Vacant(_) => Ok(()),
            Entry::Occupied(existing) if existing.get().status == BetStatus::Pending => {
                existing.remove();
                Ok(())
            }
            Entry::Occupied(_) => Err(StoreError::Immutable(format!("bet {bet} is resolved"))),
        }
    }

    async fn bet(&self, bet: &BetId) -> StoreResult<Option<BetRecord>> {
        Ok(self.bets.get(bet).map(|b| b.value().clone()))
    }

    async fn bets_for_user(&self, user: &UserKey, limit: Option<usize>) -> StoreResult<Vec<BetRecord>> {
        let mut bets: Vec<BetRecord> = self
            .bets
            .iter()
            .filter(|b| &b.user_key == user)
            .map(|b| b.value().clone())
            .collect();
        bets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            bets.truncate(limit);
        }
        Ok(bets)
    }

    async fn pending_bets(&self, before: DateTime<Utc>) -> StoreResult<Vec<BetRecord>> {
        let mut bets: Vec<BetRecord> = self
            .bets
            .iter()
            .filter(|b| b.status == BetStatus::Pending && b.created_at <= before)
            .map(|b| b.value().clone())
            .collect();
        bets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(bets)
    }
}

#[async_trait]
impl DepositStore for MemoryStore {
    async fn apply_deposit(&self, deposit: &DepositEvent) -> StoreResult<DepositApplied> {
        let slot = self.slot(&deposit.user_key);
        let mut slot = slot.lock().await;
        let key = op_key::deposit(&deposit.tx_hash);

        match self.deposits.entry(deposit.tx_hash.clone()) {
            Entry::Occupied(mut existing) => {
                if let Some(processed_at) = existing.get().processed_at {
                    return Ok(DepositApplied::AlreadyProcessed { processed_at });
                }
                let receipt = self.credit_locked(&mut slot, deposit.amount, &key)?;
                let record = existing.get_mut();
                record.user_key = deposit.user_key.clone();
                record.amount = deposit.amount;
                record.confirmations = deposit.confirmations;
                record.processed_at = Some(receipt.op.created_at);
                Ok(DepositApplied::Credited(receipt))
            }
            Entry::Vacant(vacant) => {
                let receipt = self.credit_locked(&mut slot, deposit.amount, &key)?;
                let mut record = deposit.clone();
                record.processed_at = Some(receipt.op.created_at);
                vacant.insert(record);
                Ok(DepositApplied::Credited(receipt))
            }
        }
    }

    async fn record_sighting(&self, deposit: &DepositEvent) -> StoreResult<()> {
        match self.deposits.entry(deposit.tx_hash.clone()) {
            Entry::Occupied(mut existing) => {
                let record = existing.get_mut();
                if !record.is_processed() {
                    record.confirmations = record.confirmations.max(deposit.confirmations);
                }
            }
            Entry::Vacant(vacant) => {
                let mut record = deposit.clone();
                record.processed_at = None;
                vacant.insert(record);
            }
        }
        Ok(())
    }

    async fn deposit(&self, tx_hash: &TxHash) -> StoreResult<Option<DepositEvent>> {
        Ok(self.deposits.get(tx_hash).map(|d| d.value().clone()))
    }

    async fn pending_deposits(&self, user: &UserKey) -> StoreResult<Vec<DepositEvent>> {
        let mut pending: Vec<DepositEvent> = self
            .deposits
            .iter()
            .filter(|d| &d.user_key == user && !d.is_processed())
            .map(|d| d.value().clone())
            .collect();
        pending.sort_by(|a, b| a.first_seen_at.cmp(&b.first_seen_at));
        Ok(pending)
    }
}
