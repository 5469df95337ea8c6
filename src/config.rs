//! Bridge configuration section, for hosts that wire the bridge from a
//! TOML config file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::reload::ReloadConfig;

/// Helper function for default true value
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Whether scripting is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Modules warmed at startup, before the first hot-path call
    #[serde(default)]
    pub preload: Vec<String>,

    /// Whether the hot-reload watcher runs (default: true)
    #[serde(default = "default_true")]
    pub hot_reload: bool,

    /// Directories watched for script source changes
    #[serde(default)]
    pub watch_paths: Vec<PathBuf>,

    /// Whether watch roots are scanned recursively (default: true)
    #[serde(default = "default_true")]
    pub recursive: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preload: Vec::new(),
            hot_reload: true,
            watch_paths: Vec::new(),
            recursive: true,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Watcher config for this section, or `None` when hot reload is
    /// disabled or there is nothing to watch.
    pub fn reload_config(&self) -> Option<ReloadConfig> {
        if !self.enabled || !self.hot_reload || self.watch_paths.is_empty() {
            return None;
        }
        let mut config = ReloadConfig::new(self.watch_paths.clone());
        if !self.recursive {
            config = config.non_recursive();
        }
        Some(config)
    }
}
