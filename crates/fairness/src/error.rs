//! Fairness verification errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FairnessError {
    #[error("Seed does not match commitment: expected {expected}, got {actual}")]
    CommitmentMismatch { expected: String, actual: String },

    #[error("Outcome mismatch: recorded {recorded}, recomputed {computed}")]
    OutcomeMismatch { recorded: u8, computed: u8 },
}
