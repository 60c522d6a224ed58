use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BdeError, BdeResult};
use crate::types::Geometry;

/// Top-level configuration (loaded from bde.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BdeConfig {
    pub geometry: Geometry,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl BdeConfig {
    /// Parse a TOML document and validate its geometry.
    pub fn from_toml(content: &str) -> BdeResult<Self> {
        let config: BdeConfig =
            toml::from_str(content).map_err(|e| BdeError::Config(e.to_string()))?;
        config.geometry.validate()?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when the file does not exist.
    pub fn load(path: &Path) -> BdeResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}
