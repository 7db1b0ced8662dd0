// Configuration management for the citynet relay
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/citynet/config.json
// - Linux: ~/.config/citynet/config.json
// - Windows: %APPDATA%\citynet\config.json

use anyhow::{Context, Result};
use citynet_core::RelayConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port the WebSocket gateway listens on
    pub listen_port: u16,

    /// Topology file loaded at startup
    pub topology_path: Option<String>,

    /// Relay behaviour
    pub relay: RelayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: 8000,
            topology_path: None,
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("citynet");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the default config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load from `path`, or from the platform config file when `None`.
    ///
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_file()?,
        };

        if config_file.exists() {
            let contents = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file {}", config_file.display()))?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&config_file)?;
            Ok(config)
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        vec![
            ("listen_port".to_string(), self.listen_port.to_string()),
            (
                "topology_path".to_string(),
                self.topology_path.clone().unwrap_or_else(|| "(none)".to_string()),
            ),
            (
                "keepalive_interval".to_string(),
                format!("{}s", self.relay.keepalive_interval_secs),
            ),
            ("send_timeout".to_string(), format!("{}ms", self.relay.send_timeout_ms)),
            ("monitor_city".to_string(), self.relay.monitor_city.clone()),
            ("codec_workers".to_string(), self.relay.codec_workers.to_string()),
            ("system_notices".to_string(), self.relay.system_notices.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen_port, 8000);
        assert!(config.topology_path.is_none());
        assert_eq!(config.relay.monitor_city, "Monitor_Admin");
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"listen_port":9100,"relay":{"system_notices":false}}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.listen_port, 9100);
        assert!(!config.relay.system_notices);
        assert_eq!(config.relay.codec_workers, 4);
    }
}
