//! DiceBank Fairness - provably fair dice rolls
//!
//! Server seeds are committed by publishing `sha256(seed)` before a bet's
//! client seed is known. Once the bet is recorded the seed is revealed and
//! anyone can recompute the roll from `(server_seed, client_seed, nonce)`.

pub mod error;
pub mod outcome;
pub mod seed;

pub use error::FairnessError;
pub use outcome::{compute_outcome, verify_bet, DICE_FACES};
pub use seed::{generate_server_seed, hash_seed, verify_commitment};
