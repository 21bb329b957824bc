//! Engine configuration
//!
//! Settings are read from `<config dir>/opgraph/config.json` when present,
//! otherwise the built-in defaults apply.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::PersistenceError;

static DEFAULT_CONFIG: Lazy<EngineConfig> = Lazy::new(EngineConfig::default);

/// Tunables for compilation and evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Float slots available to a compiled point graph
    pub stack_capacity: usize,
    /// Elements per parallel chunk, also the cancellation polling granularity
    pub parallel_grain: usize,
    /// Log evaluation requests dropped because another evaluation is running
    pub log_evaluation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_capacity: constants::stack::DEFAULT_CAPACITY,
            parallel_grain: constants::parallel::DEFAULT_GRAIN,
            log_evaluation: false,
        }
    }
}

impl EngineConfig {
    /// Shared default configuration
    pub fn global() -> &'static EngineConfig {
        &DEFAULT_CONFIG
    }

    /// Location of the user configuration file, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(constants::config::APP_DIR).join(constants::config::FILE_NAME))
    }

    /// Read a configuration file
    pub fn from_file(path: &Path) -> Result<Self, PersistenceError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        Ok(config.sanitized())
    }

    /// Load the user configuration, falling back to defaults when it is missing or unreadable
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => {
                debug!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring configuration {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    // Zero grain would make chunking panic; a stack needs room for at least one opcode.
    fn sanitized(mut self) -> Self {
        self.parallel_grain = self.parallel_grain.max(1);
        self.stack_capacity = self.stack_capacity.max(1);
        self
    }
}
