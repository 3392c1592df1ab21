//! Deposit Reconciler - exactly-once crediting of confirmed deposits
//!
//! Webhooks arrive at least once. The transaction hash is the dedup key,
//! and the store records it in the same unit as the credit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dicebank_core::{Amount, DepositEvent, TxHash, UserKey};
use dicebank_store::{DepositApplied, LedgerStore};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, Rejection};
use crate::seeds::SeedLedger;

const MAX_TX_HASH_LEN: usize = 128;

/// A deposit confirmation as delivered by the chain watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositConfirmation {
    pub tx_hash: TxHash,
    pub user_key: UserKey,
    pub amount: Amount,
    pub confirmations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    Credited {
        tx_hash: TxHash,
        user_key: UserKey,
        amount: Amount,
        balance: Amount,
    },
    /// Duplicate delivery; nothing changed
    AlreadyProcessed {
        tx_hash: TxHash,
        processed_at: DateTime<Utc>,
    },
    Rejected(Rejection),
}

#[derive(Clone)]
pub struct DepositReconciler {
    store: Arc<dyn LedgerStore>,
    seeds: SeedLedger,
    config: EngineConfig,
}

impl DepositReconciler {
    pub fn new(store: Arc<dyn LedgerStore>, seeds: SeedLedger, config: EngineConfig) -> Self {
        Self {
            store,
            seeds,
            config,
        }
    }

    fn validate(&self, confirmation: &DepositConfirmation) -> Result<(), EngineError> {
        let tx = confirmation.tx_hash.as_str();
        if tx.is_empty() || tx.len() > MAX_TX_HASH_LEN || tx.chars().any(char::is_whitespace) {
            return Err(EngineError::InvalidDeposit(format!("malformed transaction hash {tx:?}")));
        }
        if confirmation.user_key.as_str().is_empty() {
            return Err(EngineError::InvalidDeposit("missing user key".into()));
        }
        if confirmation.amount.is_zero() {
            return Err(EngineError::InvalidDeposit("amount must be positive".into()));
        }
        Ok(())
    }

    pub async fn on_deposit_confirmed(
        &self,
        confirmation: &DepositConfirmation,
    ) -> Result<DepositOutcome, EngineError> {
        self.validate(confirmation)?;

        let event = DepositEvent::new(
            confirmation.tx_hash.clone(),
            confirmation.user_key.clone(),
            confirmation.amount,
            confirmation.confirmations,
        );

        let need = self.config.min_confirmations;
        if confirmation.confirmations < need {
            self.store.record_sighting(&event).await?;
            tracing::debug!(
                tx = %confirmation.tx_hash,
                have = confirmation.confirmations,
                need,
                "Deposit awaiting confirmations"
            );
            return Ok(DepositOutcome::Rejected(Rejection::InsufficientConfirmations {
                have: confirmation.confirmations,
                need,
            }));
        }

        if confirmation.amount < self.config.min_deposit {
            tracing::warn!(
                tx = %confirmation.tx_hash,
                amount = %confirmation.amount,
                minimum = %self.config.min_deposit,
                "Deposit below advertised minimum, crediting anyway"
            );
        }

        match self.store.apply_deposit(&event).await? {
            DepositApplied::Credited(receipt) if receipt.replayed => {
                Ok(DepositOutcome::AlreadyProcessed {
                    tx_hash: confirmation.tx_hash.clone(),
                    processed_at: receipt.op.created_at,
                })
            }
            DepositApplied::Credited(receipt) => {
                tracing::info!(
                    tx = %confirmation.tx_hash,
                    user = %confirmation.user_key,
                    amount = %confirmation.amount,
                    balance = %receipt.balance_after(),
                    "Deposit credited"
                );
                // Funded players get a committed round before they can bet
                if let Err(err) = self.seeds.published_commitment(&confirmation.user_key).await {
                    tracing::warn!(user = %confirmation.user_key, error = %err, "Could not commit first round");
                }
                Ok(DepositOutcome::Credited {
                    tx_hash: confirmation.tx_hash.clone(),
                    user_key: confirmation.user_key.clone(),
                    amount: confirmation.amount,
                    balance: receipt.balance_after(),
                })
            }
            DepositApplied::AlreadyProcessed { processed_at } => {
                tracing::debug!(tx = %confirmation.tx_hash, "Duplicate deposit delivery ignored");
                Ok(DepositOutcome::AlreadyProcessed {
                    tx_hash: confirmation.tx_hash.clone(),
                    processed_at,
                })
            }
        }
    }

    /// Deposits seen with too few confirmations so far
    pub async fn pending_deposits(&self, user: &UserKey) -> Result<Vec<DepositEvent>, EngineError> {
        Ok(self.store.pending_deposits(user).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicebank_store::{AccountStore, MemoryStore, SeedStore};

    fn reconciler() -> (Arc<MemoryStore>, DepositReconciler) {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn LedgerStore> = store.clone();
        let reconciler = DepositReconciler::new(shared.clone(), SeedLedger::new(shared), EngineConfig::default());
        (store, reconciler)
    }

    fn confirmation(tx: &str, amount: u64, confirmations: u32) -> DepositConfirmation {
        DepositConfirmation {
            tx_hash: TxHash::from(tx),
            user_key: UserKey::from("alice"),
            amount: Amount::from_whole(amount).unwrap(),
            confirmations,
        }
    }

    #[tokio::test]
    async fn test_invalid_deposits() {
        let (_, reconciler) = reconciler();
        let mut zero = confirmation("tx", 1, 3);
        zero.amount = Amount::ZERO;

        for bad in [zero, confirmation("", 5, 3), confirmation("has space", 5, 3)] {
            assert!(matches!(
                reconciler.on_deposit_confirmed(&bad).await,
                Err(EngineError::InvalidDeposit(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_small_deposit_still_credited() {
        let (store, reconciler) = reconciler();
        let outcome = reconciler.on_deposit_confirmed(&confirmation("tx-small", 1, 5)).await.unwrap();
        assert!(matches!(outcome, DepositOutcome::Credited { .. }));
        assert_eq!(
            store.account(&UserKey::from("alice")).await.unwrap().balance,
            Amount::from_whole(1).unwrap()
        );
    }

    #[tokio::test]
    async fn test_credit_commits_first_round() {
        let (store, reconciler) = reconciler();
        let alice = UserKey::from("alice");
        assert!(store.open_round(&alice).await.unwrap().is_none());

        reconciler.on_deposit_confirmed(&confirmation("tx-r", 5, 3)).await.unwrap();
        let round = store.open_round(&alice).await.unwrap().unwrap();

        // A second deposit keeps the same open round
        reconciler.on_deposit_confirmed(&confirmation("tx-r2", 5, 3)).await.unwrap();
        assert_eq!(store.open_round(&alice).await.unwrap().unwrap().round_id, round.round_id);
    }

    #[tokio::test]
    async fn test_under_confirmed_deposit_is_pending() {
        let (_, reconciler) = reconciler();
        let outcome = reconciler.on_deposit_confirmed(&confirmation("tx-p", 5, 1)).await.unwrap();
        assert_eq!(
            outcome,
            DepositOutcome::Rejected(Rejection::InsufficientConfirmations { have: 1, need: 3 })
        );

        let pending = reconciler.pending_deposits(&UserKey::from("alice")).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].confirmations, 1);
    }

    #[test]
    fn test_confirmation_wire_format() {
        let json = r#"{"txHash":"abc","userKey":"u1","amount":5000000,"confirmations":3}"#;
        let parsed: DepositConfirmation = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.tx_hash, TxHash::from("abc"));
        assert_eq!(parsed.amount, Amount::from_whole(5).unwrap());
    }
}
