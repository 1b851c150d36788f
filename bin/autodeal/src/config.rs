use autodeal_types::{DealDefaults, MAX_DURATION_EPOCHS, MIN_DURATION_EPOCHS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the per-task artifacts are written to
    pub output_dir: PathBuf,

    /// Base URL of the coordination service API
    pub coordinator_url: String,

    /// Storage node JSON-RPC endpoint
    pub node_rpc_url: String,

    /// Bearer token for the storage node API
    #[serde(default)]
    pub node_auth_token: Option<String>,

    /// Seconds between batches in daemon mode (default: 600)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Pause between proposal attempts in milliseconds (default: 0)
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Proposal attempts per offer (default: 60)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Node request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Prometheus text file rewritten after every batch
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,

    /// Deal defaults
    pub deal: DealDefaults,
}

fn default_poll_interval() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    autodeal_engine::MAX_PROPOSAL_ATTEMPTS
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigFileError::Invalid(
                "output_dir must not be empty".to_string(),
            ));
        }

        for (name, url) in [
            ("coordinator_url", &self.coordinator_url),
            ("node_rpc_url", &self.node_rpc_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigFileError::Invalid(format!(
                    "{} must be an http(s) URL, got {:?}",
                    name, url
                )));
            }
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigFileError::Invalid(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigFileError::Invalid(
                "max_attempts must be > 0".to_string(),
            ));
        }

        if self.deal.sender_wallet.trim().is_empty() {
            return Err(ConfigFileError::Invalid(
                "deal.sender_wallet is required".to_string(),
            ));
        }

        if self.deal.price_per_gib.is_zero() {
            return Err(ConfigFileError::Invalid(
                "deal.price_per_gib must be positive".to_string(),
            ));
        }

        if !self.deal.skip_confirmation {
            return Err(ConfigFileError::Invalid(
                "deal.skip_confirmation must be true: the daemon cannot confirm deals interactively"
                    .to_string(),
            ));
        }

        if self.deal.start_epoch_hours <= 0 {
            return Err(ConfigFileError::Invalid(
                "deal.start_epoch_hours must be > 0".to_string(),
            ));
        }

        if !(MIN_DURATION_EPOCHS..=MAX_DURATION_EPOCHS).contains(&self.deal.duration_epochs) {
            return Err(ConfigFileError::Invalid(format!(
                "deal.duration_epochs must be in range [{}, {}], got {}",
                MIN_DURATION_EPOCHS, MAX_DURATION_EPOCHS, self.deal.duration_epochs
            )));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
