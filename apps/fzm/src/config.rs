//! Client configuration.
//!
//! Read from JSON at `<config dir>/fzm/config.json`:
//! - Linux: `$XDG_CONFIG_HOME/fzm/config.json` or `~/.config/fzm/config.json`
//! - Windows: `%APPDATA%/fzm/config.json`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fzm_protocol::constants::DEFAULT_HOST;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service host, optionally with a port.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Preference store location; the platform default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

fn default_endpoint() -> String {
    DEFAULT_HOST.to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            log_level: default_log_level(),
            store_path: None,
        }
    }
}

impl ClientConfig {
    /// Reads the configuration at `path`. A missing file yields defaults.
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Where the preference store lives.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store_path
            .clone()
            .or_else(fzm_settings::default_store_path)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> Option<PathBuf> {
    fzm_settings::config_dir().map(|d| d.join("fzm").join("config.json"))
}
