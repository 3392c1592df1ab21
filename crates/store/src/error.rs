//! Storage errors

use dicebank_core::AmountError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Record is immutable: {0}")]
    Immutable(String),

    #[error("Balance overflow for {0}")]
    Overflow(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Amount error: {0}")]
    Amount(#[from] AmountError),
}

impl StoreError {
    pub fn duplicate(kind: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            key: key.into(),
        }
    }

    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Immutable(_))
    }

    /// Transient failures the caller may retry without side effects
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}
