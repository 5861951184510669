//! Engine configuration.

use crate::{StateError, StateResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Database directory.
    pub db_path: PathBuf,
    /// Keyed-store block cache size in MiB.
    #[serde(default = "default_cache_size_mib")]
    pub cache_size_mib: u64,
    /// Number of most recent blocks whose unspent outputs are loaded into
    /// the in-memory cache on startup.
    #[serde(default = "default_utxo_window")]
    pub utxo_window: u32,
}

fn default_cache_size_mib() -> u64 {
    100
}

fn default_utxo_window() -> u32 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data"),
            cache_size_mib: default_cache_size_mib(),
            utxo_window: default_utxo_window(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> StateResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| StateError::Config(e.to_string()))?;
        toml::from_str(&content).map_err(|e| StateError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> StateResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StateError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| StateError::Config(e.to_string()))
    }
}
