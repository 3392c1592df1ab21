//! Deposit address collaborator
//!
//! Address derivation (HD wallet math, key custody) lives outside the
//! engine. The engine only needs `derive_address(user)`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dicebank_core::{Amount, UserKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("No address available for {user}: {reason}")]
    Unavailable { user: String, reason: String },

    #[error("Address service failed: {source}")]
    ServiceFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Address returned to a player, with the advisory deposit terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositAddress {
    pub user_key: UserKey,
    pub address: String,
    pub min_deposit: Amount,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AddressDeriver: Send + Sync {
    /// Name of the backing service, for logs
    fn name(&self) -> &str;

    async fn derive_address(&self, user: &UserKey) -> Result<String, AddressError>;
}

/// Deterministic stand-in: testnet-looking addresses derived from the user key.
///
/// Not a wallet. Funds sent to these addresses are unrecoverable.
pub struct MockAddressDeriver {
    prefix: String,
    overrides: RwLock<HashMap<UserKey, String>>,
}

impl MockAddressDeriver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Pin a fixed address for a user
    pub fn set_address(&self, user: UserKey, address: impl Into<String>) -> Result<(), AddressError> {
        self.overrides
            .write()
            .map_err(|e| AddressError::ServiceFailed {
                source: e.to_string().into(),
            })?
            .insert(user, address.into());
        Ok(())
    }
}

impl Default for MockAddressDeriver {
    fn default() -> Self {
        Self::new("addr_test1")
    }
}

#[async_trait]
impl AddressDeriver for MockAddressDeriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn derive_address(&self, user: &UserKey) -> Result<String, AddressError> {
        if user.as_str().is_empty() {
            return Err(AddressError::Unavailable {
                user: String::new(),
                reason: "empty user key".into(),
            });
        }

        let pinned = self
            .overrides
            .read()
            .map_err(|e| AddressError::ServiceFailed {
                source: e.to_string().into(),
            })?
            .get(user)
            .cloned();
        if let Some(address) = pinned {
            return Ok(address);
        }

        let digest = Sha256::digest(user.as_str().as_bytes());
        Ok(format!("{}{}", self.prefix, &hex::encode(digest)[..50]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic_per_user() {
        let deriver = MockAddressDeriver::default();
        let a = deriver.derive_address(&UserKey::from("alice")).await.unwrap();
        let b = deriver.derive_address(&UserKey::from("alice")).await.unwrap();
        let c = deriver.derive_address(&UserKey::from("bob")).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("addr_test1"));
        assert_eq!(a.len(), "addr_test1".len() + 50);
    }

    #[tokio::test]
    async fn test_pinned_address() {
        let deriver = MockAddressDeriver::default();
        deriver.set_address(UserKey::from("alice"), "addr1fixed").unwrap();
        assert_eq!(
            deriver.derive_address(&UserKey::from("alice")).await.unwrap(),
            "addr1fixed"
        );
    }

    #[tokio::test]
    async fn test_empty_user_rejected() {
        let deriver = MockAddressDeriver::default();
        assert!(matches!(
            deriver.derive_address(&UserKey::from("")).await,
            Err(AddressError::Unavailable { .. })
        ));
    }
}
