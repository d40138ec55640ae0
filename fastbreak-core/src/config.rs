use crate::error::{FastbreakError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONTRACT_ADDRESS_ENV: &str = "FASTBREAK_CONTRACT_ADDRESS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Emulator,
}

impl std::str::FromStr for Network {
    type Err = FastbreakError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "emulator" | "local" => Ok(Network::Emulator),
            other => Err(FastbreakError::config(format!("Unknown network: {}", other))),
        }
    }
}

/// Client settings. Fields missing from a config file take their defaults;
/// durations are written as whole milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub network: Network,
    pub access_node_url: String,
    pub contract_address: String,
    pub compute_limit: u64,
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Blocks that must seal after the commit block before reveal is submitted.
    pub min_block_gap: u64,
    pub assignment_event: String,
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    #[serde(rename = "header_delay_ms", with = "duration_ms")]
    pub header_delay: Duration,
    #[serde(rename = "reveal_interval_ms", with = "duration_ms")]
    pub reveal_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            header_delay: Duration::from_millis(500),
            reveal_interval: Duration::from_secs(3),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: Network::Emulator,
            access_node_url: "http://localhost:8888".to_string(),
            contract_address: "0xf8d6e0586b0a20c7".to_string(),
            compute_limit: 9999,
            poll_interval: Duration::from_millis(500),
            min_block_gap: 0,
            assignment_event: "ParticipantAssigned".to_string(),
            pacing: PacingConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(network: Network) -> Self {
        let mut config = Self::default();
        config.network = network;

        match network {
            Network::Mainnet => {
                config.access_node_url = "https://rest-mainnet.onflow.org".to_string();
                config.contract_address = String::new();
            }
            Network::Testnet => {
                config.access_node_url = "https://rest-testnet.onflow.org".to_string();
                config.contract_address = String::new();
            }
            Network::Emulator => {
                // keep defaults for the emulator
            }
        }

        config
    }

    /// Load a JSON config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = serde_json::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(address) = std::env::var(CONTRACT_ADDRESS_ENV) {
            if !address.trim().is_empty() {
                tracing::debug!("Contract address overridden from {}", CONTRACT_ADDRESS_ENV);
                self.contract_address = address.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_node_url.is_empty() {
            return Err(FastbreakError::config("Access node URL cannot be empty"));
        }

        if self.contract_address.is_empty() {
            return Err(FastbreakError::config(format!(
                "Contract address cannot be empty (set {})",
                CONTRACT_ADDRESS_ENV
            )));
        }

        if !self.contract_address.starts_with("0x") {
            return Err(FastbreakError::config(
                "Contract address must be 0x-prefixed",
            ));
        }

        if self.compute_limit == 0 {
            return Err(FastbreakError::config(
                "Compute limit must be greater than 0",
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(FastbreakError::config(
                "Poll interval must be greater than 0",
            ));
        }

        if self.assignment_event.is_empty() {
            return Err(FastbreakError::config(
                "Assignment event name cannot be empty",
            ));
        }

        Ok(())
    }

    /// Block explorer link for a transaction, where the network has one.
    pub fn explorer_url(&self, transaction_id: &str) -> Option<String> {
        match self.network {
            Network::Mainnet => Some(format!("https://www.flowscan.io/tx/{}", transaction_id)),
            Network::Testnet => Some(format!(
                "https://testnet.flowscan.io/tx/{}",
                transaction_id
            )),
            Network::Emulator => None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
