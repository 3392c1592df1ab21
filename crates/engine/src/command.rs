//! Command interface for chat-style front ends
//!
//! A front end turns a user interaction into a [`CommandInput`] and
//! dispatches it by name. Commands never format output; they return a
//! structured [`CommandReply`] for the presentation layer.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use dicebank_core::{Amount, BetId, UserKey};
use thiserror::Error;

use crate::address::DepositAddress;
use crate::game::GameCore;
use crate::error::EngineError;
use crate::seeds::PublishedCommitment;
use crate::stats::PlayerStats;
use crate::wager::{BetOutcome, FairnessProof};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing option: {0}")]
    MissingOption(String),

    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CommandError {
    fn invalid(name: &str, reason: impl ToString) -> Self {
        Self::InvalidOption {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Invoking user plus named options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInput {
    pub user: UserKey,
    pub options: HashMap<String, String>,
}

impl CommandInput {
    pub fn new(user: UserKey) -> Self {
        Self {
            user,
            options: HashMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.options.insert(name.to_string(), value.into());
        self
    }

    /// Build from `name=value` arguments
    pub fn from_args<S: AsRef<str>>(user: UserKey, args: &[S]) -> Result<Self, CommandError> {
        let mut input = Self::new(user);
        for arg in args {
            let arg = arg.as_ref();
            let (name, value) = arg
                .split_once('=')
                .ok_or_else(|| CommandError::invalid(arg, "expected name=value"))?;
            input.options.insert(name.trim().to_string(), value.trim().to_string());
        }
        Ok(input)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, CommandError> {
        self.get(name)
            .ok_or_else(|| CommandError::MissingOption(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Balance {
        user_key: UserKey,
        balance: Amount,
        pending_deposits: usize,
    },
    DepositAddress(DepositAddress),
    Commitment(PublishedCommitment),
    Bet(BetOutcome),
    Stats {
        user_key: UserKey,
        stats: PlayerStats,
    },
    Verified(FairnessProof),
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Cheap input checks run before `execute`
    fn validate(&self, _input: &CommandInput) -> Result<(), CommandError> {
        Ok(())
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError>;
}

pub struct BalanceCommand;

#[async_trait]
impl Command for BalanceCommand {
    fn name(&self) -> &'static str {
        "balance"
    }

    fn description(&self) -> &'static str {
        "Check your balance"
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError> {
        let balance = core.balance(&input.user).await?;
        let pending = core.deposits().pending_deposits(&input.user).await?;
        Ok(CommandReply::Balance {
            user_key: input.user.clone(),
            balance,
            pending_deposits: pending.len(),
        })
    }
}

pub struct DepositCommand;

#[async_trait]
impl Command for DepositCommand {
    fn name(&self) -> &'static str {
        "deposit"
    }

    fn description(&self) -> &'static str {
        "Get a deposit address"
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError> {
        Ok(CommandReply::DepositAddress(
            core.request_deposit_address(&input.user).await?,
        ))
    }
}

pub struct CommitmentCommand;

#[async_trait]
impl Command for CommitmentCommand {
    fn name(&self) -> &'static str {
        "commitment"
    }

    fn description(&self) -> &'static str {
        "Show the server seed hash your next roll uses"
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError> {
        Ok(CommandReply::Commitment(
            core.seeds().published_commitment(&input.user).await?,
        ))
    }
}

pub struct DiceCommand;

impl DiceCommand {
    fn parse(input: &CommandInput) -> Result<(Amount, u8, &str), CommandError> {
        let amount = input.require("amount")?;
        let stake = Amount::from_str(amount).map_err(|e| CommandError::invalid("amount", e))?;

        let prediction = input.require("prediction")?;
        let prediction = prediction
            .parse::<u8>()
            .map_err(|e| CommandError::invalid("prediction", e))?;
        if !(1..=6).contains(&prediction) {
            return Err(CommandError::invalid("prediction", "must be between 1 and 6"));
        }

        let seed = input.require("seed")?;
        Ok((stake, prediction, seed))
    }
}

#[async_trait]
impl Command for DiceCommand {
    fn name(&self) -> &'static str {
        "dice"
    }

    fn description(&self) -> &'static str {
        "Roll the dice: amount, prediction (1-6) and your client seed"
    }

    fn validate(&self, input: &CommandInput) -> Result<(), CommandError> {
        Self::parse(input).map(|_| ())
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError> {
        let (stake, prediction, seed) = Self::parse(input)?;
        Ok(CommandReply::Bet(
            core.place_bet(&input.user, stake, prediction, seed).await?,
        ))
    }
}

pub struct StatsCommand;

#[async_trait]
impl Command for StatsCommand {
    fn name(&self) -> &'static str {
        "stats"
    }

    fn description(&self) -> &'static str {
        "View your betting statistics"
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError> {
        Ok(CommandReply::Stats {
            user_key: input.user.clone(),
            stats: core.wagers().stats(&input.user).await?,
        })
    }
}

pub struct VerifyCommand;

#[async_trait]
impl Command for VerifyCommand {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn description(&self) -> &'static str {
        "Recompute a settled roll from its revealed seed"
    }

    fn validate(&self, input: &CommandInput) -> Result<(), CommandError> {
        input.require("bet").map(|_| ())
    }

    async fn execute(&self, core: &GameCore, input: &CommandInput) -> Result<CommandReply, CommandError> {
        let bet_id = BetId::from(input.require("bet")?);
        // Other users' bets look unknown
        let bet = core.wagers().bet(&bet_id).await?;
        if bet.user_key != input.user {
            return Err(CommandError::Engine(EngineError::UnknownBet(bet_id)));
        }
        Ok(CommandReply::Verified(core.wagers().verify(&bet_id).await?))
    }
}

/// Name to command map
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Arc<dyn Command>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// Registry with every built-in command
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BalanceCommand));
        registry.register(Arc::new(DepositCommand));
        registry.register(Arc::new(CommitmentCommand));
        registry.register(Arc::new(DiceCommand));
        registry.register(Arc::new(StatsCommand));
        registry.register(Arc::new(VerifyCommand));
        registry
    }

    /// Register a command, replacing any with the same name
    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    /// `(name, description)` pairs in name order
    pub fn describe(&self) -> Vec<(&'static str, &'static str)> {
        self.commands
            .values()
            .map(|c| (c.name(), c.description()))
            .collect()
    }

    pub async fn dispatch(
        &self,
        core: &GameCore,
        name: &str,
        input: &CommandInput,
    ) -> Result<CommandReply, CommandError> {
        let command = self
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;

        command.validate(input)?;
        tracing::debug!(command = name, user = %input.user, "Dispatching command");
        command.execute(core, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::MockAddressDeriver;
    use crate::config::EngineConfig;
    use dicebank_store::{AccountStore, MemoryStore};

    fn core() -> (Arc<MemoryStore>, GameCore) {
        let store = Arc::new(MemoryStore::new());
        let core = GameCore::new(
            store.clone(),
            EngineConfig::default(),
            Arc::new(MockAddressDeriver::default()),
        );
        (store, core)
    }

    #[test]
    fn test_from_args() {
        let input = CommandInput::from_args(UserKey::from("u"), &["amount=2", "prediction = 4"]).unwrap();
        assert_eq!(input.get("amount"), Some("2"));
        assert_eq!(input.get("prediction"), Some("4"));
        assert!(CommandInput::from_args(UserKey::from("u"), &["oops"]).is_err());
    }

    #[test]
    fn test_registry_lists_builtins() {
        let registry = CommandRegistry::with_defaults();
        let names: Vec<_> = registry.describe().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["balance", "commitment", "deposit", "dice", "stats", "verify"]);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (_, core) = core();
        let registry = CommandRegistry::with_defaults();
        let result = registry
            .dispatch(&core, "slots", &CommandInput::new(UserKey::from("u")))
            .await;
        assert!(matches!(result, Err(CommandError::UnknownCommand(_))));
    }

    #[tokio::test]
    async fn test_dice_validation_runs_before_execute() {
        let (store, core) = core();
        let registry = CommandRegistry::with_defaults();
        let user = UserKey::from("u");

        let input = CommandInput::new(user.clone()).with("amount", "1").with("prediction", "9").with("seed", "s");
        assert!(matches!(
            registry.dispatch(&core, "dice", &input).await,
            Err(CommandError::InvalidOption { .. })
        ));

        let input = CommandInput::new(user.clone()).with("amount", "1").with("prediction", "3");
        assert!(matches!(
            registry.dispatch(&core, "dice", &input).await,
            Err(CommandError::MissingOption(name)) if name == "seed"
        ));

        // Nothing was touched
        assert_eq!(store.account(&user).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_dice_then_verify_through_registry() {
        let (store, core) = core();
        let registry = CommandRegistry::with_defaults();
        let user = UserKey::from("u");
        store.credit(&user, Amount::from_whole(10).unwrap(), "deposit:t").await.unwrap();

        let input = CommandInput::new(user.clone())
            .with("amount", "2")
            .with("prediction", "4")
            .with("seed", "my-seed");
        let CommandReply::Bet(BetOutcome::Settled(settled)) =
            registry.dispatch(&core, "dice", &input).await.unwrap()
        else {
            panic!("expected a settled bet");
        };

        let verify = CommandInput::new(user.clone()).with("bet", settled.bet_id.as_str());
        let reply = registry.dispatch(&core, "verify", &verify).await.unwrap();
        assert_eq!(reply, CommandReply::Verified(settled.proof.clone()));

        // Someone else cannot pull the proof
        let other = CommandInput::new(UserKey::from("v")).with("bet", settled.bet_id.as_str());
        assert!(registry.dispatch(&core, "verify", &other).await.is_err());
    }

    #[tokio::test]
    async fn test_balance_and_deposit_address() {
        let (_, core) = core();
        let registry = CommandRegistry::with_defaults();
        let input = CommandInput::new(UserKey::from("u"));

        let reply = registry.dispatch(&core, "balance", &input).await.unwrap();
        assert_eq!(
            reply,
            CommandReply::Balance {
                user_key: UserKey::from("u"),
                balance: Amount::ZERO,
                pending_deposits: 0
            }
        );

        let CommandReply::DepositAddress(address) =
            registry.dispatch(&core, "deposit", &input).await.unwrap()
        else {
            panic!("expected an address");
        };
        assert!(address.address.starts_with("addr_test1"));
        assert_eq!(address.min_deposit, Amount::from_whole(2).unwrap());
        assert!(address.expires_at > chrono::Utc::now() + chrono::Duration::hours(23));
    }
}
