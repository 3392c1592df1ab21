//! Wager Engine - places and settles single dice bets
//!
//! A bet is persisted `Pending` before its stake is reserved, so a bet
//! interrupted at any point can be found and resolved by
//! [`WagerEngine::recover_pending`]. Only the debit and each credit are
//! atomic; the engine does not hold the account across the roll.

use std::sync::Arc;

use chrono::Utc;
use dicebank_core::{op_key, Amount, BetId, BetRecord, BetStatus, RoundId, UserKey};
use dicebank_fairness::{compute_outcome, verify_bet, FairnessError, DICE_FACES};
use dicebank_store::{DebitOutcome, ExclusiveCredit, LedgerStore};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EngineConfig};
use crate::error::{EngineError, Rejection};
use crate::seeds::SeedLedger;
use crate::state::WagerState;
use crate::stats::PlayerStats;

/// Everything a third party needs to recompute a roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairnessProof {
    pub round_id: RoundId,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub outcome: u8,
}

impl FairnessProof {
    pub fn verify(&self) -> Result<(), FairnessError> {
        verify_bet(
            &self.server_seed,
            &self.server_seed_hash,
            &self.client_seed,
            self.nonce,
            self.outcome,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledBet {
    pub bet_id: BetId,
    pub user_key: UserKey,
    pub stake: Amount,
    pub prediction: u8,
    pub outcome: u8,
    pub won: bool,
    pub payout: Amount,
    /// Balance right after settlement
    pub balance: Amount,
    pub proof: FairnessProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BetOutcome {
    Settled(SettledBet),
    /// Refused without touching the balance
    Rejected(Rejection),
}

/// Which of the two rival credits a funds-holding bet ended with
enum Resolution {
    Refunded,
    Paid,
}

/// Result of a recovery sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Pending bets that never reserved funds
    pub discarded: usize,
    /// Bets whose payout had already been credited
    pub settled: usize,
    /// Bets refunded and marked failed
    pub refunded: usize,
}

#[derive(Clone)]
pub struct WagerEngine {
    store: Arc<dyn LedgerStore>,
    seeds: SeedLedger,
    config: EngineConfig,
}

impl WagerEngine {
    pub fn new(store: Arc<dyn LedgerStore>, seeds: SeedLedger, config: EngineConfig) -> Self {
        Self {
            store,
            seeds,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn validate(&self, stake: Amount, prediction: u8, client_seed: &str) -> Result<(), EngineError> {
        if stake.is_zero() {
            return Err(EngineError::InvalidWager("stake must be positive".into()));
        }
        if stake < self.config.min_stake {
            return Err(EngineError::InvalidWager(format!(
                "minimum bet is {}",
                self.config.min_stake
            )));
        }
        if stake > self.config.max_stake {
            return Err(EngineError::InvalidWager(format!(
                "maximum bet is {}",
                self.config.max_stake
            )));
        }
        if prediction == 0 || u32::from(prediction) > DICE_FACES {
            return Err(EngineError::InvalidWager(format!(
                "prediction must be between 1 and {DICE_FACES}, got {prediction}"
            )));
        }
        if client_seed.is_empty() {
            return Err(EngineError::InvalidWager("client seed is required".into()));
        }
        if client_seed.chars().count() > self.config.max_client_seed_len {
            return Err(EngineError::InvalidWager(format!(
                "client seed longer than {} characters",
                self.config.max_client_seed_len
            )));
        }
        if client_seed.chars().any(char::is_control) {
            return Err(EngineError::InvalidWager(
                "client seed contains control characters".into(),
            ));
        }
        Ok(())
    }

    /// Place and settle one bet.
    ///
    /// Insufficient funds is an `Ok(BetOutcome::Rejected)`. Any failure after
    /// the stake was reserved refunds it before the error is returned.
    pub async fn place_bet(
        &self,
        user: &UserKey,
        stake: Amount,
        prediction: u8,
        client_seed: &str,
    ) -> Result<BetOutcome, EngineError> {
        self.validate(stake, prediction, client_seed)?;

        // The round this bet will claim exists before the bet does
        self.seeds.published_commitment(user).await?;

        let bet_id = BetId::generate();
        let mut state = WagerState::Created;
        let mut record = BetRecord::new(
            bet_id.clone(),
            user.clone(),
            stake,
            prediction,
            client_seed.to_string(),
        );
        self.store.insert_bet(&record).await?;

        // On error the record stays pending; recovery checks whether the debit landed.
        let debit = self
            .store
            .reserve_and_debit(user, stake, &op_key::stake(&bet_id))
            .await?;

        match debit {
            DebitOutcome::InsufficientFunds { available } => {
                state.advance(WagerState::Rejected)?;
                self.store.discard_bet(&bet_id).await?;
                tracing::info!(
                    user = %user,
                    stake = %stake,
                    available = %available,
                    "Bet rejected: insufficient funds"
                );
                return Ok(BetOutcome::Rejected(Rejection::InsufficientFunds {
                    available,
                    required: stake,
                }));
            }
            DebitOutcome::Debited(_) => state.advance(WagerState::FundsReserved)?,
        }

        match self.settle(&mut record, &mut state).await {
            Ok(settled) => {
                tracing::info!(
                    bet = %settled.bet_id,
                    user = %user,
                    stake = %stake,
                    prediction,
                    outcome = settled.outcome,
                    payout = %settled.payout,
                    "Bet settled"
                );
                self.publish_next_round(user).await;
                Ok(BetOutcome::Settled(settled))
            }
            Err(err) => {
                tracing::warn!(bet = %bet_id, state = %state, error = %err, "Bet failed, compensating");
                self.compensate(&mut record, &mut state, &err).await;
                Err(err)
            }
        }
    }

    async fn settle(
        &self,
        record: &mut BetRecord,
        state: &mut WagerState,
    ) -> Result<SettledBet, EngineError> {
        let user = record.user_key.clone();
        let nonce = self.store.next_nonce(&user).await?;
        let commitment = self.seeds.claim(&user, &record.bet_id).await?;

        let outcome = compute_outcome(&commitment.server_seed, &record.client_seed, nonce);
        let won = outcome == record.prediction;
        let payout = if won {
            record
                .stake
                .mul_floor(self.config.payout_multiplier)
                .ok_or_else(|| EngineError::InvalidWager("payout out of range".into()))?
        } else {
            Amount::ZERO
        };

        // The outcome is on record before the seed leaves the ledger
        record.nonce = nonce;
        record.round_id = Some(commitment.round_id.clone());
        record.server_seed_hash = Some(commitment.server_seed_hash.clone());
        record.outcome = Some(outcome);
        record.payout = payout;
        self.store.update_bet(record).await?;
        state.advance(WagerState::OutcomeComputed)?;

        let server_seed = self.seeds.reveal(&commitment.round_id).await?;

        // Payout and refund exclude each other; a loss records a zero payout
        let balance = match self
            .store
            .credit_unless(
                &user,
                payout,
                &op_key::payout(&record.bet_id),
                &op_key::refund(&record.bet_id),
            )
            .await?
        {
            ExclusiveCredit::Credited(receipt) => receipt.balance_after(),
            ExclusiveCredit::Blocked(_) => return Err(EngineError::BetRefunded(record.bet_id.clone())),
        };

        record.status = BetStatus::Settled;
        record.resolved_at = Some(Utc::now());
        self.mark_settled(record).await?;
        state.advance(WagerState::Settled)?;

        Ok(SettledBet {
            bet_id: record.bet_id.clone(),
            user_key: user,
            stake: record.stake,
            prediction: record.prediction,
            outcome,
            won,
            payout,
            balance,
            proof: FairnessProof {
                round_id: commitment.round_id,
                server_seed,
                server_seed_hash: commitment.server_seed_hash,
                client_seed: record.client_seed.clone(),
                nonce,
                outcome,
            },
        })
    }

    /// Commit the user's next round now so its hash can be shown before they bet again
    async fn publish_next_round(&self, user: &UserKey) {
        if let Err(err) = self.seeds.published_commitment(user).await {
            // The next bet commits its own round if this one is missing
            tracing::warn!(user = %user, error = %err, "Could not pre-commit next round");
        }
    }

    /// Write the settled record, accepting one that recovery already settled
    async fn mark_settled(&self, record: &BetRecord) -> Result<(), EngineError> {
        match self.store.update_bet(record).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_immutable() => match self.store.bet(&record.bet_id).await? {
                Some(stored) if stored.status == BetStatus::Settled => Ok(()),
                _ => Err(err.into()),
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn compensate(&self, record: &mut BetRecord, state: &mut WagerState, err: &EngineError) {
        if !state.holds_funds() {
            return;
        }
        if matches!(err, EngineError::BetRefunded(_)) {
            let _ = state.advance(WagerState::Failed);
            return;
        }

        // A credited payout means the bet did settle; only the record lags behind.
        match self.store.find_op(&op_key::payout(&record.bet_id)).await {
            Ok(None) => {}
            Ok(Some(_)) => {
                tracing::warn!(bet = %record.bet_id, "Payout already credited, leaving bet for recovery");
                return;
            }
            Err(lookup) => {
                tracing::error!(bet = %record.bet_id, error = %lookup, "Cannot inspect payout, leaving bet for recovery");
                return;
            }
        }

        match self.refund_and_fail(record, &err.to_string()).await {
            Ok(Resolution::Refunded) => {
                // Failed is reachable from every funds-holding state
                let _ = state.advance(WagerState::Failed);
            }
            Ok(Resolution::Paid) => {
                tracing::warn!(bet = %record.bet_id, "Payout landed first, leaving bet for recovery");
            }
            Err(refund_err) => {
                tracing::error!(
                    bet = %record.bet_id,
                    error = %refund_err,
                    "Refund failed, leaving bet for recovery"
                );
            }
        }
    }

    async fn refund_and_fail(&self, record: &mut BetRecord, reason: &str) -> Result<Resolution, EngineError> {
        let receipt = match self
            .store
            .credit_unless(
                &record.user_key,
                record.stake,
                &op_key::refund(&record.bet_id),
                &op_key::payout(&record.bet_id),
            )
            .await?
        {
            ExclusiveCredit::Credited(receipt) => receipt,
            ExclusiveCredit::Blocked(_) => return Ok(Resolution::Paid),
        };

        record.status = BetStatus::Failed;
        record.failure_reason = Some(reason.to_string());
        record.resolved_at = Some(Utc::now());
        match self.store.update_bet(record).await {
            Ok(()) => {}
            // Already marked failed by whoever refunded first
            Err(err) if err.is_immutable() && receipt.replayed => {}
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            bet = %record.bet_id,
            user = %record.user_key,
            stake = %record.stake,
            replayed = receipt.replayed,
            "Stake refunded"
        );
        Ok(Resolution::Refunded)
    }

    /// Mark a paid bet settled from its freshest stored record
    async fn settle_paid(&self, bet_id: &BetId) -> Result<(), EngineError> {
        let Some(mut stored) = self.store.bet(bet_id).await? else {
            return Ok(());
        };
        if stored.status.is_resolved() {
            return Ok(());
        }
        stored.status = BetStatus::Settled;
        stored.resolved_at = Some(Utc::now());
        match self.store.update_bet(&stored).await {
            Err(err) if !err.is_immutable() => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Resolve bets left `Pending` by crashes, cancellation or storage outages.
    ///
    /// Only bets older than `grace` are touched so in-flight bets are not raced.
    pub async fn recover_pending(&self, grace: chrono::Duration) -> Result<RecoveryReport, EngineError> {
        let cutoff = Utc::now()
            .checked_sub_signed(grace)
            .ok_or_else(|| ConfigError::Invalid(format!("recovery grace out of range: {grace}")))?;
        let mut report = RecoveryReport::default();

        for mut bet in self.store.pending_bets(cutoff).await? {
            if self.store.find_op(&op_key::stake(&bet.bet_id)).await?.is_none() {
                self.store.discard_bet(&bet.bet_id).await?;
                report.discarded += 1;
                continue;
            }

            if self.store.find_op(&op_key::payout(&bet.bet_id)).await?.is_some() {
                self.settle_paid(&bet.bet_id).await?;
                report.settled += 1;
                continue;
            }

            match self.refund_and_fail(&mut bet, "interrupted before settlement").await? {
                Resolution::Refunded => report.refunded += 1,
                Resolution::Paid => {
                    self.settle_paid(&bet.bet_id).await?;
                    report.settled += 1;
                }
            }
        }

        if report != RecoveryReport::default() {
            tracing::info!(
                discarded = report.discarded,
                settled = report.settled,
                refunded = report.refunded,
                "Recovered pending bets"
            );
        }
        Ok(report)
    }

    pub async fn bet(&self, bet_id: &BetId) -> Result<BetRecord, EngineError> {
        self.store
            .bet(bet_id)
            .await?
            .ok_or_else(|| EngineError::UnknownBet(bet_id.clone()))
    }

    pub async fn recent_bets(&self, user: &UserKey, limit: usize) -> Result<Vec<BetRecord>, EngineError> {
        Ok(self.store.bets_for_user(user, Some(limit)).await?)
    }

    pub async fn stats(&self, user: &UserKey) -> Result<PlayerStats, EngineError> {
        let bets = self.store.bets_for_user(user, None).await?;
        Ok(PlayerStats::from_bets(&bets))
    }

    /// Rebuild and check the fairness proof of a settled bet
    pub async fn verify(&self, bet_id: &BetId) -> Result<FairnessProof, EngineError> {
        let bet = self.bet(bet_id).await?;
        let (Some(round_id), Some(outcome), BetStatus::Settled) = (bet.round_id.clone(), bet.outcome, bet.status)
        else {
            return Err(EngineError::InvalidWager(format!("bet {bet_id} is not settled")));
        };

        let round = self
            .seeds
            .audit(&round_id)
            .await?
            .ok_or_else(|| EngineError::UnknownRound(round_id.clone()))?;

        let proof = FairnessProof {
            round_id,
            server_seed: round.server_seed,
            server_seed_hash: round.server_seed_hash,
            client_seed: bet.client_seed,
            nonce: bet.nonce,
            outcome,
        };
        proof.verify()?;
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicebank_store::{AccountStore, BetStore, MemoryStore};

    fn ada(whole: u64) -> Amount {
        Amount::from_whole(whole).unwrap()
    }

    fn engine() -> (Arc<MemoryStore>, WagerEngine) {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn LedgerStore> = store.clone();
        let engine = WagerEngine::new(shared.clone(), SeedLedger::new(shared), EngineConfig::default());
        (store, engine)
    }

    #[tokio::test]
    async fn test_invalid_wagers() {
        let (_, engine) = engine();
        let user = UserKey::from("alice");

        for (stake, prediction, seed) in [
            (Amount::ZERO, 3, "s"),
            (Amount::from_minor(1), 3, "s"),
            (ada(101), 3, "s"),
            (ada(1), 0, "s"),
            (ada(1), 7, "s"),
            (ada(1), 3, ""),
            (ada(1), 3, "bad\nseed"),
        ] {
            assert!(matches!(
                engine.place_bet(&user, stake, prediction, seed).await,
                Err(EngineError::InvalidWager(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_settled_bet_balances_and_verifies() {
        let (store, engine) = engine();
        let user = UserKey::from("alice");
        store.credit(&user, ada(10), "deposit:t1").await.unwrap();

        let BetOutcome::Settled(settled) = engine.place_bet(&user, ada(2), 3, "client").await.unwrap()
        else {
            panic!("expected settlement");
        };

        let expected_payout = if settled.won { ada(11) } else { Amount::ZERO };
        assert_eq!(settled.payout, expected_payout);
        assert_eq!(settled.balance, ada(8).checked_add(expected_payout).unwrap());
        assert!(settled.proof.verify().is_ok());
        assert_eq!(settled.proof.nonce, 1);

        let proof = engine.verify(&settled.bet_id).await.unwrap();
        assert_eq!(proof, settled.proof);

        let record = engine.bet(&settled.bet_id).await.unwrap();
        assert_eq!(record.status, BetStatus::Settled);
    }

    #[tokio::test]
    async fn test_rejected_bet_leaves_no_record() {
        let (store, engine) = engine();
        let user = UserKey::from("bob");
        store.credit(&user, ada(1), "deposit:t1").await.unwrap();

        let outcome = engine.place_bet(&user, ada(2), 4, "seed").await.unwrap();
        assert_eq!(
            outcome,
            BetOutcome::Rejected(Rejection::InsufficientFunds {
                available: ada(1),
                required: ada(2)
            })
        );
        assert!(engine.recent_bets(&user, 10).await.unwrap().is_empty());
        assert_eq!(store.account(&user).await.unwrap().balance, ada(1));
    }

    #[tokio::test]
    async fn test_next_round_published_after_settlement() {
        let (store, engine) = engine();
        let user = UserKey::from("carol");
        store.credit(&user, ada(5), "deposit:t1").await.unwrap();

        let BetOutcome::Settled(first) = engine.place_bet(&user, ada(1), 1, "a").await.unwrap() else {
            panic!("expected settlement");
        };
        let open = engine.seeds.published_commitment(&user).await.unwrap();
        assert_ne!(open.round_id, first.proof.round_id);

        let BetOutcome::Settled(second) = engine.place_bet(&user, ada(1), 1, "a").await.unwrap() else {
            panic!("expected settlement");
        };
        assert_eq!(second.proof.round_id, open.round_id);
        assert_eq!(second.proof.nonce, 2);
    }

    #[tokio::test]
    async fn test_recovery_discards_unreserved_bet() {
        let (store, engine) = engine();
        let bet = BetRecord::new(BetId::from("orphan"), UserKey::from("dave"), ada(1), 2, "s".into());
        store.insert_bet(&bet).await.unwrap();

        let report = engine.recover_pending(chrono::Duration::zero()).await.unwrap();
        assert_eq!(report.discarded, 1);
        assert!(store.bet(&bet.bet_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_after_bets() {
        let (store, engine) = engine();
        let user = UserKey::from("erin");
        store.credit(&user, ada(20), "deposit:t1").await.unwrap();
        for _ in 0..4 {
            engine.place_bet(&user, ada(1), 6, "stats").await.unwrap();
        }

        let stats = engine.stats(&user).await.unwrap();
        assert_eq!(stats.total_bets, 4);
        assert_eq!(stats.total_wagered, ada(4));
        assert_eq!(stats.total_won, Amount::from_minor(stats.wins * 5_500_000));
    }
}
