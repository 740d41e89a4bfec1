//! Configuration for slotstore

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the slot store directory
    #[serde(default = "default_store_path", rename = "store-path")]
    pub store_path: PathBuf,

    /// Interval between polls for `ss watch`
    #[serde(default = "default_poll_interval_ms", rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solotab")
        .join("slots")
}

fn default_poll_interval_ms() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    /// Load config from file, or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return config.validated();
        }

        // Try default locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("slotstore").join("config.yml")),
            Some(PathBuf::from("slotstore.yml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return config.validated();
            }
        }

        Ok(Config::default())
    }

    fn validated(self) -> Result<Self> {
        if self.poll_interval_ms == 0 {
            return Err(eyre!("poll-interval-ms must be greater than 0"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("slotstore.yml");
        let yaml = format!("store-path: {}\npoll-interval-ms: 40\n", temp.path().join("slots").display());
        std::fs::write(&path, yaml).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.store_path, temp.path().join("slots"));
        assert_eq!(loaded.poll_interval_ms, 40);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.yml");
        std::fs::write(&path, "store-path: /tmp/elsewhere\n").unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.store_path, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(loaded.poll_interval_ms, crate::DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("zero.yml");
        std::fs::write(&path, "poll-interval-ms: 0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("poll-interval-ms"));
    }
}
