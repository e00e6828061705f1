//! Configuration management for the Auriga coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::SubmitConfig;
use crate::error::{OracleError, OracleResult};
use crate::ledger::{Address, AssetId};
use crate::tx::fees::FeeParams;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    pub network: NetworkConfig,
    pub oracle: OracleConfig,
    pub fees: FeeParams,
    pub indexer: IndexerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub instance_id: String,
    /// Validity window length for built transactions, in slots.
    pub ttl_slots: u64,
    pub submit: SubmitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// One of "mainnet", "preview", "preprod" or "custom".
    pub name: String,
    pub zero_time_ms: Option<u64>,
    pub zero_slot: Option<u64>,
    pub slot_length_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Hex-encoded oracle script address.
    pub address: String,
    /// Hex-encoded minting policy of the state marker token.
    pub marker_policy: String,
    /// Asset name of the state marker token (UTF-8).
    pub marker_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

/// Slot-to-time conversion parameters of the target network.
#[derive(Debug, Clone, Copy)]
pub struct SlotConfig {
    /// POSIX timestamp of slot `zero_slot`, in milliseconds.
    pub zero_time_ms: u64,
    pub zero_slot: u64,
    pub slot_length_ms: u64,
}

impl SlotConfig {
    pub fn posix_time_ms(&self, slot: u64) -> u64 {
        self.zero_time_ms + slot.saturating_sub(self.zero_slot) * self.slot_length_ms
    }
}

impl NetworkConfig {
    pub fn slot_config(&self) -> OracleResult<SlotConfig> {
        match self.name.as_str() {
            "mainnet" => Ok(SlotConfig {
                zero_time_ms: 1_596_059_091_000,
                zero_slot: 4_492_800,
                slot_length_ms: 1_000,
            }),
            "preview" => Ok(SlotConfig {
                zero_time_ms: 1_666_656_000_000,
                zero_slot: 0,
                slot_length_ms: 1_000,
            }),
            "preprod" => Ok(SlotConfig {
                zero_time_ms: 1_655_769_600_000,
                zero_slot: 86_400,
                slot_length_ms: 1_000,
            }),
            "custom" => {
                match (self.zero_time_ms, self.zero_slot, self.slot_length_ms) {
                    (Some(zero_time_ms), Some(zero_slot), Some(slot_length_ms))
                        if slot_length_ms > 0 =>
                    {
                        Ok(SlotConfig {
                            zero_time_ms,
                            zero_slot,
                            slot_length_ms,
                        })
                    }
                    _ => Err(OracleError::Config(
                        "custom network requires zero_time_ms, zero_slot and a positive slot_length_ms".into(),
                    )),
                }
            }
            other => Err(OracleError::Config(format!("Unknown network: {}", other))),
        }
    }
}

impl OracleConfig {
    pub fn oracle_address(&self) -> OracleResult<Address> {
        Address::from_hex(&self.address)
    }

    pub fn marker(&self) -> OracleResult<AssetId> {
        let policy = hex::decode(&self.marker_policy)
            .map_err(|e| OracleError::Config(format!("Invalid marker policy hex: {}", e)))?;
        Ok(AssetId::new(policy, self.marker_name.as_bytes().to_vec()))
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("AURIGA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.indexer.base_url.is_empty() {
            anyhow::bail!("Indexer base_url must be configured");
        }
        if self.coordinator.ttl_slots == 0 {
            anyhow::bail!("ttl_slots must be positive");
        }
        if self.fees.min_fee_a == 0 || self.fees.coins_per_utxo_byte == 0 {
            anyhow::bail!("Fee parameters must be positive");
        }
        self.network
            .slot_config()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        self.oracle
            .oracle_address()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        self.oracle
            .marker()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn slot_time_conversion_matches_network_origin() {
        let config = NetworkConfig {
            name: "mainnet".into(),
            zero_time_ms: None,
            zero_slot: None,
            slot_length_ms: None,
        };
        let slots = config.slot_config().unwrap();
        assert_eq!(slots.posix_time_ms(4_492_800), 1_596_059_091_000);
        assert_eq!(slots.posix_time_ms(4_492_810), 1_596_059_101_000);
    }

    #[test]
    fn custom_network_requires_explicit_slot_config() {
        let config = NetworkConfig {
            name: "custom".into(),
            zero_time_ms: Some(0),
            zero_slot: Some(0),
            slot_length_ms: None,
        };
        assert!(config.slot_config().is_err());
    }
}
