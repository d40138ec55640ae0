use anyhow::{Context, Result};
use fastbreak_core::{ClientConfig, Network};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub config_path: PathBuf,
    pub default_network: Network,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("fastbreak")
                .join("config.json"),
            default_network: Network::Emulator,
        }
    }
}

impl CliConfig {
    /// Client settings: the config file when it exists, otherwise the
    /// network defaults. The environment overrides either.
    pub fn resolve(
        &self,
        explicit_path: Option<&Path>,
        network: Option<Network>,
    ) -> Result<ClientConfig> {
        let path = explicit_path.unwrap_or(&self.config_path);

        let mut config = if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            ClientConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        } else if explicit_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        } else {
            let mut config = ClientConfig::new(network.unwrap_or(self.default_network));
            config.apply_env();
            config
        };

        if let Some(network) = network {
            if network != config.network {
                tracing::debug!("Network overridden to {:?}", network);
                config.network = network;
                config.access_node_url = ClientConfig::new(network).access_node_url;
            }
        }

        Ok(config)
    }
}
