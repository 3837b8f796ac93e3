//! Config store for loading and saving addonmatch.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{AddonmatchConfig, parser};

pub const CONFIG_FILE_NAME: &str = "addonmatch.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store at the platform config directory.
    pub fn from_default_location() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("addonmatch");
        Ok(Self::from_dir(config_dir))
    }

    pub fn from_dir(config_dir: impl AsRef<Path>) -> Self {
        Self::from_path(config_dir.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn from_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config; a missing file yields the defaults.
    pub fn load(&self) -> anyhow::Result<AddonmatchConfig> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "no config file, using defaults");
            return Ok(AddonmatchConfig::new());
        }
        parser::parse_config_file(&self.config_path)
    }

    pub fn save(&self, config: &AddonmatchConfig) -> anyhow::Result<()> {
        config.validate()?;
        let content = parser::to_toml(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        Ok(())
    }
}
