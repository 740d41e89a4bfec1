//! Solotab configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;
use crate::signal::{DEFAULT_MAX_LOG_BYTES, DEFAULT_SIGNAL_CAPACITY};

/// Main solotab configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); CLI flag wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Shared slot location
    pub store: StoreConfig,

    /// Protocol policy
    pub coordinator: CoordinatorConfig,

    /// Cross-process signal log
    pub signals: SignalsConfig,

    /// Slot file polling
    pub watch: WatchConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: ./solotab.yml
        let local_config = PathBuf::from("solotab.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/solotab/solotab.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("solotab").join("solotab.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject values that would panic a channel or spin a poll loop
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("coordinator.channel-buffer", self.coordinator.channel_buffer as u64),
            ("signals.capacity", self.signals.capacity as u64),
            ("signals.poll-interval-ms", self.signals.poll_interval_ms),
            ("watch.poll-interval-ms", self.watch.poll_interval_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(eyre!("{} must be greater than 0", name));
            }
        }
        Ok(())
    }
}

/// Shared slot location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding slot files and the signal log
    pub dir: PathBuf,

    /// Registry key naming the slot
    pub key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("solotab")
                .join("slots"),
            key: slotstore::DEFAULT_SLOT_KEY.to_string(),
        }
    }
}

/// Cross-process signal log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Interval between tails of the signal log
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Local broadcast capacity per process
    pub capacity: usize,

    /// Log size past which the next broadcast truncates it
    #[serde(rename = "max-log-bytes")]
    pub max_log_bytes: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            capacity: DEFAULT_SIGNAL_CAPACITY,
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
        }
    }
}

/// Slot file polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: slotstore::DEFAULT_POLL_INTERVAL_MS,
        }
    }
}
