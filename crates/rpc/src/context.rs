//! Application context - wires everything together

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dicebank_engine::{
    CommandError, CommandInput, CommandRegistry, CommandReply, DepositWebhook, EngineConfig,
    GameCore, MockAddressDeriver, RecoveryReport, WebhookVerifier,
};
use dicebank_store::SqliteStore;

/// Env var holding the hex Ed25519 key that signs deposit webhooks
pub const WEBHOOK_PUBKEY_ENV: &str = "DICEBANK_WEBHOOK_PUBKEY";

pub struct AppContext {
    pub core: GameCore,
    pub registry: CommandRegistry,
    pub webhook: DepositWebhook,
    store: Arc<SqliteStore>,
    db_path: PathBuf,
    recovered: RecoveryReport,
}

impl AppContext {
    /// Open the data directory, loading `config_path` if given
    pub async fn new(data_path: impl AsRef<Path>, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => EngineConfig::default(),
        };

        let verifier = match std::env::var(WEBHOOK_PUBKEY_ENV) {
            Ok(key) => Some(
                WebhookVerifier::from_hex(key.trim())
                    .with_context(|| format!("{WEBHOOK_PUBKEY_ENV} is not a valid key"))?,
            ),
            Err(_) => None,
        };

        Self::with_config(data_path, config, verifier).await
    }

    /// Open with an explicit config; runs the recovery sweep before returning
    pub async fn with_config(
        data_path: impl AsRef<Path>,
        config: EngineConfig,
        verifier: Option<WebhookVerifier>,
    ) -> anyhow::Result<Self> {
        let data_path = data_path.as_ref();
        std::fs::create_dir_all(data_path)?;
        let db_path = data_path.join("dicebank.db");

        let store = Arc::new(SqliteStore::open(&db_path).await?);
        config.validate()?;
        let grace = config.recovery_grace()?;
        let core = GameCore::new(
            store.clone(),
            config,
            Arc::new(MockAddressDeriver::default()),
        );
        let webhook = DepositWebhook::new(core.deposits().clone(), verifier);

        // Bets interrupted by a previous run are settled or refunded first
        let recovered = core.wagers().recover_pending(grace).await?;
        tracing::debug!(db = %db_path.display(), "DiceBank context ready");

        Ok(Self {
            core,
            registry: CommandRegistry::with_defaults(),
            webhook,
            store,
            db_path,
            recovered,
        })
    }

    /// Dispatch a user-facing command through the registry
    pub async fn run(&self, name: &str, input: &CommandInput) -> Result<CommandReply, CommandError> {
        self.registry.dispatch(&self.core, name, input).await
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// What the startup recovery sweep did
    pub fn recovered(&self) -> &RecoveryReport {
        &self.recovered
    }

    /// Flush and close the database
    pub async fn close(self) {
        self.store.close().await;
    }
}
