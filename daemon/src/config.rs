//! Configuration management (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    #[serde(default)]
    pub lists: ListsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Seconds between reconciliation sweeps over the process table.
    pub housekeeping_interval_secs: u64,
}

/// Optional overrides for the allow/deny list file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig {
                housekeeping_interval_secs: 300,
            },
            lists: ListsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "powerguard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
