//! Engine configuration.
//!
//! Loaded from `engine.toml` in the tycoon config directory. Every field has
//! a default so a missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Runtime configuration for the script engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory scanned for `.lua` plugins.
    pub plugin_dir: PathBuf,

    /// JSON file backing `park.shared_storage`.
    pub shared_storage_path: PathBuf,

    /// Watch the plugin directory and reload edited plugins.
    pub hot_reload: bool,

    /// Minimum time between two hot reload drains.
    pub hot_reload_interval_ms: u64,

    /// Role in a replicated session.
    pub network_mode: NetworkMode,

    /// Upper bound on sockets scripts may hold open at once.
    pub max_sockets: usize,

    /// Allow unresearched ride entries in new parks.
    pub ignore_research_status: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let base = config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            plugin_dir: base.join("plugin"),
            shared_storage_path: base.join("plugin.store.json"),
            hot_reload: false,
            hot_reload_interval_ms: 1000,
            network_mode: NetworkMode::None,
            max_sockets: 16,
            ignore_research_status: false,
        }
    }
}

impl EngineConfig {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load from an explicit path, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Role of this process in a replicated session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    None,
    Server,
    Client,
}

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tycoon"))
}

/// Get the path to engine.toml.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("engine.toml"))
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
