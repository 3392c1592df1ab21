//! GameCore - the engine facade handed to front ends

use std::sync::Arc;

use chrono::Utc;
use dicebank_core::{Account, Amount, LedgerOp, UserKey};
use dicebank_store::LedgerStore;

use crate::address::{AddressDeriver, DepositAddress};
use crate::config::{ConfigError, EngineConfig};
use crate::deposits::{DepositConfirmation, DepositOutcome, DepositReconciler};
use crate::error::EngineError;
use crate::seeds::SeedLedger;
use crate::wager::{BetOutcome, WagerEngine};

#[derive(Clone)]
pub struct GameCore {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
    seeds: SeedLedger,
    wagers: WagerEngine,
    deposits: DepositReconciler,
    addresses: Arc<dyn AddressDeriver>,
}

impl GameCore {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        config: EngineConfig,
        addresses: Arc<dyn AddressDeriver>,
    ) -> Self {
        let seeds = SeedLedger::new(store.clone());
        let wagers = WagerEngine::new(store.clone(), seeds.clone(), config.clone());
        let deposits = DepositReconciler::new(store.clone(), seeds.clone(), config.clone());
        Self {
            store,
            config,
            seeds,
            wagers,
            deposits,
            addresses,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn seeds(&self) -> &SeedLedger {
        &self.seeds
    }

    pub fn wagers(&self) -> &WagerEngine {
        &self.wagers
    }

    pub fn deposits(&self) -> &DepositReconciler {
        &self.deposits
    }

    pub async fn balance(&self, user: &UserKey) -> Result<Amount, EngineError> {
        Ok(self.store.account(user).await?.balance)
    }

    pub async fn account(&self, user: &UserKey) -> Result<Account, EngineError> {
        Ok(self.store.account(user).await?)
    }

    pub async fn history(&self, user: &UserKey, limit: usize) -> Result<Vec<LedgerOp>, EngineError> {
        Ok(self.store.history(user, limit).await?)
    }

    pub async fn place_bet(
        &self,
        user: &UserKey,
        stake: Amount,
        prediction: u8,
        client_seed: &str,
    ) -> Result<BetOutcome, EngineError> {
        self.wagers.place_bet(user, stake, prediction, client_seed).await
    }

    pub async fn on_deposit_confirmed(
        &self,
        confirmation: &DepositConfirmation,
    ) -> Result<DepositOutcome, EngineError> {
        self.deposits.on_deposit_confirmed(confirmation).await
    }

    pub async fn request_deposit_address(&self, user: &UserKey) -> Result<DepositAddress, EngineError> {
        let ttl = self.config.deposit_address_ttl()?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| ConfigError::Invalid(format!("deposit address expiry out of range: {ttl}")))?;
        let address = self.addresses.derive_address(user).await?;
        tracing::debug!(user = %user, deriver = self.addresses.name(), "Issued deposit address");
        Ok(DepositAddress {
            user_key: user.clone(),
            address,
            min_deposit: self.config.min_deposit,
            expires_at,
        })
    }
}
