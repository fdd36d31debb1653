//! Configuration Management
//!
//! Handles persistent configuration storage for ibmvpc.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Region used when nothing else picks one
pub const DEFAULT_REGION: &str = "us-south";

/// Environment variable for the default region
pub const REGION_ENV: &str = "IBMCLOUD_REGION";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    /// API version date
    #[serde(default)]
    pub api_version: Option<String>,
    /// API generation
    #[serde(default)]
    pub generation: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ibmvpc").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file, falling back to defaults
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective region (CLI > config > IBMCLOUD_REGION > us-south)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(|| std::env::var(REGION_ENV).ok().filter(|r| !r.is_empty()))
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Get effective API version (CLI > config); `None` means SDK default
    pub fn effective_version(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string).or_else(|| self.api_version.clone())
    }

    /// Get effective generation (CLI > config); `None` means SDK default
    pub fn effective_generation(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string).or_else(|| self.generation.clone())
    }
}
