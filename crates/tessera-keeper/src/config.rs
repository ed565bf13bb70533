use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_distributor::DEFAULT_CHUNK_SIZE;
use tessera_types::Address;

/// Keeper configuration, loaded from TOML with CLI overrides on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Hex address of the network record the keeper serves.
    pub network: String,
    /// Hex address of the signing authority used for submissions.
    pub authority: String,
    /// Reward pool distributed per epoch, in base token units.
    pub reward_pool: u64,
    /// Root upload chunk size in bytes. A protocol parameter; deployments
    /// size it to their transport's payload ceiling.
    pub chunk_size: usize,
    /// Epoch-boundary poll interval for the control loop.
    pub poll_interval_ms: u64,
    /// Where distribution artifacts (tree dumps with proofs) are written.
    /// `None` disables artifact output.
    pub artifact_dir: Option<PathBuf>,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            network: Address::ZERO.to_hex(),
            authority: Address::ZERO.to_hex(),
            reward_pool: 1_000_000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval_ms: 500,
            artifact_dir: None,
            retry: RetrySettings::default(),
        }
    }
}

impl KeeperConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading keeper config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("parsing keeper config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self).context("serializing keeper config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("writing keeper config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be non-zero");
        anyhow::ensure!(
            self.retry.max_attempts > 0,
            "retry.max_attempts must be non-zero"
        );
        Ok(())
    }

    pub fn network_address(&self) -> Result<Address> {
        Address::from_hex(&self.network).context("network is not a valid hex address")
    }

    pub fn authority_address(&self) -> Result<Address> {
        Address::from_hex(&self.authority).context("authority is not a valid hex address")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.toml");

        let mut config = KeeperConfig::default();
        config.network = Address::new_unique().to_hex();
        config.authority = Address::new_unique().to_hex();
        config.artifact_dir = Some(dir.path().join("artifacts"));
        config.save(&path).unwrap();

        let loaded = KeeperConfig::load(&path).unwrap();
        assert_eq!(loaded.network, config.network);
        assert_eq!(loaded.reward_pool, config.reward_pool);
        assert_eq!(loaded.retry.max_attempts, 5);
        assert_eq!(loaded.artifact_dir, config.artifact_dir);
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let config = KeeperConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_address_parsing() {
        let config = KeeperConfig {
            network: "not-hex".into(),
            ..Default::default()
        };
        assert!(config.network_address().is_err());
        assert!(KeeperConfig::default().network_address().is_ok());
    }
}
