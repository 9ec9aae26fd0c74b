//! Configuration management

use crate::history::DEFAULT_TIMELINE_LIMIT;
use crate::protocol::{GattProfile, RX_CHARACTERISTIC_UUID, SERVICE_UUID, TX_CHARACTERISTIC_UUID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub appearance: AppearanceConfig,
}

/// Peripheral identifiers and discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub service_uuid: Uuid,
    pub tx_characteristic_uuid: Uuid,
    pub rx_characteristic_uuid: Uuid,

    /// How long a scan waits for a pad before giving up
    pub scan_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            tx_characteristic_uuid: TX_CHARACTERISTIC_UUID,
            rx_characteristic_uuid: RX_CHARACTERISTIC_UUID,
            scan_timeout_secs: 10,
        }
    }
}

impl DeviceConfig {
    pub fn profile(&self) -> GattProfile {
        GattProfile {
            service: self.service_uuid,
            tx_characteristic: self.tx_characteristic_uuid,
            rx_characteristic: self.rx_characteristic_uuid,
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// Where sessions and events are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum events shown in a session timeline
    pub timeline_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            timeline_limit: DEFAULT_TIMELINE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    /// Show seconds in clock times
    pub show_seconds: bool,

    /// How long toast notifications stay up
    pub notification_secs: u64,
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            show_seconds: false,
            notification_secs: 3,
        }
    }
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spectator")
            .join("config.toml")
    }

    /// Directory holding the session and event records
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("spectator")))
            .unwrap_or_else(|| PathBuf::from(".spectator"))
    }

    /// Log file used while the terminal UI owns the screen
    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join("spectator.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.history.timeline_limit, 50);
        assert_eq!(config.device.profile(), GattProfile::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[device]\nscan_timeout_secs = 3\n\n[storage]\ndata_dir = \"/tmp/spectator-data\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.device.scan_timeout(), Duration::from_secs(3));
        assert_eq!(config.device.service_uuid, SERVICE_UUID);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/spectator-data"));
        assert!(!config.appearance.show_seconds);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[device\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
