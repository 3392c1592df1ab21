//! DiceBank Engine
//!
//! Provably-fair dice game over a custodial lovelace balance.
//!
//! ## Flow
//!
//! ```text
//! deposit webhook ──► DepositReconciler ──► apply_deposit (once per tx)
//!                                                │
//! dice command ──► WagerEngine                   ▼
//!                   ├── reserve_and_debit ──► Balance Store
//!                   ├── SeedLedger.claim / reveal
//!                   ├── compute_outcome
//!                   └── credit payout, publish next round
//! ```
//!
//! ## Key Components
//!
//! - [`SeedLedger`]: commit / claim / reveal of server seed rounds
//! - [`WagerEngine`]: bet lifecycle and its compensation and recovery paths
//! - [`DepositReconciler`]: idempotent deposit crediting
//! - [`DepositWebhook`]: signed deposit notifications
//! - [`CommandRegistry`]: name-dispatched commands for chat front ends
//! - [`GameCore`]: facade wiring the above to one store

pub mod address;
pub mod command;
pub mod config;
pub mod deposits;
pub mod error;
pub mod game;
pub mod seeds;
pub mod state;
pub mod stats;
pub mod wager;
pub mod webhook;

pub use address::{AddressDeriver, AddressError, DepositAddress, MockAddressDeriver};
pub use command::{Command, CommandError, CommandInput, CommandRegistry, CommandReply};
pub use config::{recovery_grace_from_secs, ConfigError, EngineConfig};
pub use deposits::{DepositConfirmation, DepositOutcome, DepositReconciler};
pub use error::{EngineError, Rejection};
pub use game::GameCore;
pub use seeds::{PublishedCommitment, RevealedRound, SeedLedger};
pub use state::WagerState;
pub use stats::PlayerStats;
pub use wager::{BetOutcome, FairnessProof, RecoveryReport, SettledBet, WagerEngine};
pub use webhook::{DepositWebhook, WebhookError, WebhookRequest, WebhookSigner, WebhookVerifier};
