//! Seed Ledger - commit-reveal server seeds
//!
//! A round's hash is stored (and may be published) before any bet that
//! uses it exists. The seed is revealed exactly once, after the bet's
//! outcome has been fixed, and stays readable for audit afterwards.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dicebank_core::{BetId, RoundId, SeedCommitment, UserKey};
use dicebank_fairness::{generate_server_seed, hash_seed};
use dicebank_store::{LedgerStore, RevealOutcome, StoreError};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// What a player may see before betting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedCommitment {
    pub round_id: RoundId,
    pub server_seed_hash: String,
    pub committed_at: DateTime<Utc>,
}

impl From<&SeedCommitment> for PublishedCommitment {
    fn from(commitment: &SeedCommitment) -> Self {
        Self {
            round_id: commitment.round_id.clone(),
            server_seed_hash: commitment.server_seed_hash.clone(),
            committed_at: commitment.committed_at,
        }
    }
}

/// A revealed round, open for third-party verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedRound {
    pub round_id: RoundId,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub claimed_by: Option<BetId>,
    pub revealed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SeedLedger {
    store: Arc<dyn LedgerStore>,
}

impl SeedLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    fn fresh(round_id: RoundId, owner: Option<UserKey>) -> SeedCommitment {
        let server_seed = generate_server_seed();
        SeedCommitment {
            round_id,
            server_seed_hash: hash_seed(&server_seed),
            server_seed,
            revealed: false,
            owner,
            claimed_by: None,
            committed_at: Utc::now(),
            revealed_at: None,
        }
    }

    async fn insert(&self, commitment: &SeedCommitment) -> Result<(), EngineError> {
        match self.store.insert_commitment(commitment).await {
            Ok(()) => Ok(()),
            Err(StoreError::Duplicate { .. }) => {
                Err(EngineError::DuplicateRound(commitment.round_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commit a new seed under `round_id` and return only its hash
    pub async fn commit(&self, round_id: &RoundId) -> Result<String, EngineError> {
        let commitment = Self::fresh(round_id.clone(), None);
        self.insert(&commitment).await?;
        tracing::debug!(round = %round_id, hash = %commitment.server_seed_hash, "Committed round");
        Ok(commitment.server_seed_hash)
    }

    /// Commit a round reserved for one user's next bet
    pub async fn commit_for(&self, user: &UserKey) -> Result<PublishedCommitment, EngineError> {
        let commitment = Self::fresh(RoundId::generate(), Some(user.clone()));
        self.insert(&commitment).await?;
        tracing::debug!(
            user = %user,
            round = %commitment.round_id,
            hash = %commitment.server_seed_hash,
            "Committed round for user"
        );
        Ok(PublishedCommitment::from(&commitment))
    }

    /// The hash the user's next bet will be settled against
    pub async fn published_commitment(
        &self,
        user: &UserKey,
    ) -> Result<PublishedCommitment, EngineError> {
        match self.store.open_round(user).await? {
            Some(commitment) => Ok(PublishedCommitment::from(&commitment)),
            None => self.commit_for(user).await,
        }
    }

    /// Bind the user's oldest pre-committed round to a bet.
    ///
    /// Never commits on the spot: a round created after the bet was
    /// accepted would not be a commitment at all.
    pub async fn claim(&self, user: &UserKey, bet: &BetId) -> Result<SeedCommitment, EngineError> {
        match self.store.claim_round(user, bet).await? {
            Some(commitment) => Ok(commitment),
            None => {
                tracing::error!(user = %user, bet = %bet, "No committed round left to claim");
                Err(EngineError::NoCommittedRound(user.clone()))
            }
        }
    }

    /// Reveal a round's seed. Succeeds once per round.
    pub async fn reveal(&self, round_id: &RoundId) -> Result<String, EngineError> {
        match self.store.mark_revealed(round_id).await? {
            RevealOutcome::Revealed(commitment) => {
                tracing::debug!(round = %round_id, "Revealed round");
                Ok(commitment.server_seed)
            }
            RevealOutcome::UnknownRound => Err(EngineError::UnknownRound(round_id.clone())),
            RevealOutcome::AlreadyRevealed => Err(EngineError::AlreadyRevealed(round_id.clone())),
        }
    }

    /// Public view of a round: the seed only once revealed
    pub async fn audit(&self, round_id: &RoundId) -> Result<Option<RevealedRound>, EngineError> {
        let commitment = self
            .store
            .commitment(round_id)
            .await?
            .ok_or_else(|| EngineError::UnknownRound(round_id.clone()))?;

        if !commitment.revealed {
            return Ok(None);
        }
        Ok(Some(RevealedRound {
            round_id: commitment.round_id,
            server_seed: commitment.server_seed,
            server_seed_hash: commitment.server_seed_hash,
            claimed_by: commitment.claimed_by,
            revealed_at: commitment.revealed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicebank_fairness::verify_commitment;
    use dicebank_store::MemoryStore;

    fn ledger() -> SeedLedger {
        SeedLedger::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_commit_then_reveal_matches_hash() {
        let ledger = ledger();
        let round = RoundId::from("round-1");

        let hash = ledger.commit(&round).await.unwrap();
        assert!(ledger.audit(&round).await.unwrap().is_none());

        let seed = ledger.reveal(&round).await.unwrap();
        assert!(verify_commitment(&seed, &hash).is_ok());

        let audited = ledger.audit(&round).await.unwrap().unwrap();
        assert_eq!(audited.server_seed, seed);
        assert_eq!(audited.server_seed_hash, hash);
    }

    #[tokio::test]
    async fn test_duplicate_round_rejected() {
        let ledger = ledger();
        let round = RoundId::from("round-1");
        ledger.commit(&round).await.unwrap();
        assert!(matches!(
            ledger.commit(&round).await,
            Err(EngineError::DuplicateRound(r)) if r == round
        ));
    }

    #[tokio::test]
    async fn test_reveal_exactly_once() {
        let ledger = ledger();
        let round = RoundId::from("round-1");

        assert!(matches!(ledger.reveal(&round).await, Err(EngineError::UnknownRound(_))));
        ledger.commit(&round).await.unwrap();
        ledger.reveal(&round).await.unwrap();
        assert!(matches!(ledger.reveal(&round).await, Err(EngineError::AlreadyRevealed(_))));
    }

    #[tokio::test]
    async fn test_claim_prefers_published_round() {
        let ledger = ledger();
        let user = UserKey::from("alice");

        let published = ledger.published_commitment(&user).await.unwrap();
        // Asking again returns the same open round
        assert_eq!(ledger.published_commitment(&user).await.unwrap(), published);

        let claimed = ledger.claim(&user, &BetId::from("b1")).await.unwrap();
        assert_eq!(claimed.round_id, published.round_id);

        // Nothing left open: a claim never commits late
        assert!(matches!(
            ledger.claim(&user, &BetId::from("b2")).await,
            Err(EngineError::NoCommittedRound(u)) if u == user
        ));

        let next = ledger.published_commitment(&user).await.unwrap();
        assert_ne!(next.round_id, published.round_id);
        let claimed = ledger.claim(&user, &BetId::from("b2")).await.unwrap();
        assert_eq!(claimed.round_id, next.round_id);
        assert_eq!(claimed.claimed_by, Some(BetId::from("b2")));
    }
}
