//! DiceBank Store - persistence for balances, seeds, bets and deposits
//!
//! Two backends implement the same traits:
//! - `MemoryStore`: per-account locks over sharded maps, not durable
//! - `SqliteStore`: transactional SQLite via sqlx, survives restarts

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    AccountStore, BetStore, DebitOutcome, DepositApplied, DepositStore, ExclusiveCredit, LedgerStore,
    OpReceipt, RevealOutcome, SeedStore,
};
