//! Engine configuration
//!
//! Every field has a serde default, so a config file only needs the values
//! it overrides.

use dicebank_core::{Amount, UNIT};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Wagering and deposit settings. Amounts are in lovelace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // === Wagers ===
    /// Payout multiplier applied to the stake on a correct prediction.
    /// 5.5 on a 1-in-6 roll leaves a house edge of about 8.3%.
    #[serde(default = "default_payout_multiplier")]
    pub payout_multiplier: Decimal,

    #[serde(default = "default_min_stake")]
    pub min_stake: Amount,

    #[serde(default = "default_max_stake")]
    pub max_stake: Amount,

    #[serde(default = "default_max_client_seed_len")]
    pub max_client_seed_len: usize,

    // === Deposits ===
    #[serde(default = "default_min_confirmations")]
    pub min_confirmations: u32,

    /// Advisory minimum shown with deposit addresses
    #[serde(default = "default_min_deposit")]
    pub min_deposit: Amount,

    #[serde(default = "default_deposit_address_ttl_hours")]
    pub deposit_address_ttl_hours: u64,

    // === Recovery ===
    /// Pending bets younger than this are left alone by the recovery sweep
    #[serde(default = "default_recovery_grace_secs")]
    pub recovery_grace_secs: u64,
}

fn default_payout_multiplier() -> Decimal {
    Decimal::new(55, 1)
}

fn default_min_stake() -> Amount {
    Amount::from_minor(UNIT / 10)
}

fn default_max_stake() -> Amount {
    Amount::from_minor(100 * UNIT)
}

fn default_max_client_seed_len() -> usize {
    64
}

fn default_min_confirmations() -> u32 {
    3
}

fn default_min_deposit() -> Amount {
    Amount::from_minor(2 * UNIT)
}

fn default_deposit_address_ttl_hours() -> u64 {
    24
}

fn default_recovery_grace_secs() -> u64 {
    60
}

const MAX_DEPOSIT_ADDRESS_TTL_HOURS: u64 = 24 * 365;
const MAX_RECOVERY_GRACE_SECS: u64 = 30 * 24 * 60 * 60;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payout_multiplier: default_payout_multiplier(),
            min_stake: default_min_stake(),
            max_stake: default_max_stake(),
            max_client_seed_len: default_max_client_seed_len(),
            min_confirmations: default_min_confirmations(),
            min_deposit: default_min_deposit(),
            deposit_address_ttl_hours: default_deposit_address_ttl_hours(),
            recovery_grace_secs: default_recovery_grace_secs(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payout_multiplier <= Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "payout_multiplier must be positive, got {}",
                self.payout_multiplier
            )));
        }
        if self.min_stake.is_zero() {
            return Err(ConfigError::Invalid("min_stake must be positive".into()));
        }
        if self.min_stake > self.max_stake {
            return Err(ConfigError::Invalid(format!(
                "min_stake {} exceeds max_stake {}",
                self.min_stake, self.max_stake
            )));
        }
        if self.max_client_seed_len == 0 {
            return Err(ConfigError::Invalid("max_client_seed_len must be positive".into()));
        }
        if self.deposit_address_ttl_hours > MAX_DEPOSIT_ADDRESS_TTL_HOURS {
            return Err(ConfigError::Invalid(format!(
                "deposit_address_ttl_hours must be at most {MAX_DEPOSIT_ADDRESS_TTL_HOURS}, got {}",
                self.deposit_address_ttl_hours
            )));
        }
        if self.recovery_grace_secs > MAX_RECOVERY_GRACE_SECS {
            return Err(ConfigError::Invalid(format!(
                "recovery_grace_secs must be at most {MAX_RECOVERY_GRACE_SECS}, got {}",
                self.recovery_grace_secs
            )));
        }
        Ok(())
    }

    pub fn deposit_address_ttl(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.deposit_address_ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "deposit_address_ttl_hours out of range: {}",
                    self.deposit_address_ttl_hours
                ))
            })
    }

    pub fn recovery_grace(&self) -> Result<chrono::Duration, ConfigError> {
        recovery_grace_from_secs(self.recovery_grace_secs)
    }
}

/// Grace period for the recovery sweep, bounded like the config field
pub fn recovery_grace_from_secs(secs: u64) -> Result<chrono::Duration, ConfigError> {
    if secs > MAX_RECOVERY_GRACE_SECS {
        return Err(ConfigError::Invalid(format!(
            "recovery grace must be at most {MAX_RECOVERY_GRACE_SECS} seconds, got {secs}"
        )));
    }
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| ConfigError::Invalid(format!("recovery grace out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.payout_multiplier, dec!(5.5));
        assert_eq!(config.min_stake, Amount::from_minor(100_000));
        assert_eq!(config.max_stake, Amount::from_minor(100_000_000));
        assert_eq!(config.min_confirmations, 3);
        assert_eq!(config.min_deposit, Amount::from_minor(2_000_000));
        assert_eq!(config.deposit_address_ttl().unwrap(), chrono::Duration::hours(24));
        assert_eq!(config.recovery_grace().unwrap(), chrono::Duration::seconds(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "payout_multiplier": "5.8", "min_confirmations": 10 }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.payout_multiplier, dec!(5.8));
        assert_eq!(config.min_confirmations, 10);
        assert_eq!(config.max_stake, default_max_stake());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let config = EngineConfig {
            min_stake: Amount::from_minor(10),
            max_stake: Amount::from_minor(5),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            payout_multiplier: Decimal::ZERO,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_durations_rejected_without_panic() {
        let json = r#"{ "recovery_grace_secs": 10000000000000000 }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(matches!(config.recovery_grace(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            deposit_address_ttl_hours: u64::MAX,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(matches!(config.deposit_address_ttl(), Err(ConfigError::Invalid(_))));

        assert!(recovery_grace_from_secs(u64::MAX).is_err());
        assert_eq!(
            recovery_grace_from_secs(MAX_RECOVERY_GRACE_SECS).unwrap(),
            chrono::Duration::days(30)
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dicebank.json");
        std::fs::write(&path, r#"{ "max_stake": 50000000 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.max_stake, Amount::from_minor(50_000_000));
        assert_eq!(config.min_confirmations, 3);
    }
}
