//! Kernel configuration.

use crate::entities::{MAIN_LAYER, MAIN_SETTINGS};
use crate::kernel::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the drawing database in the default location.
pub const DEFAULT_DATABASE_FILE: &str = "drawing.sqlite";

/// Settings used when opening a drawing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Database file. `None` keeps the drawing in memory.
    pub database: Option<PathBuf>,
    /// Name of the settings entity looked up on demand.
    pub settings_name: String,
    /// Layer used when the settings name an unknown layer.
    pub main_layer: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            database: None,
            settings_name: MAIN_SETTINGS.to_string(),
            main_layer: MAIN_LAYER.to_string(),
        }
    }
}

impl KernelConfig {
    /// Configuration for a throwaway in-memory drawing.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a drawing stored at `path`.
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Some(path.into()),
            ..Self::default()
        }
    }

    /// Drawing stored in the platform data directory.
    ///
    /// On Unix: `~/.local/share/inkcad/drawing.sqlite`
    /// On Windows: `%LOCALAPPDATA%\inkcad\drawing.sqlite`
    pub fn default_location() -> KernelResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| KernelError::Config("Could not determine home directory".to_string()))?;
        Ok(Self::with_database(base.join("inkcad").join(DEFAULT_DATABASE_FILE)))
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> KernelResult<Self> {
        serde_json::from_str(json).map_err(|e| KernelError::Config(e.to_string()))
    }

    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            KernelError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> KernelResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| KernelError::Config(e.to_string()))
    }
}
