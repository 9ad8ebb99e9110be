//! Configuration management for pcache

pub mod schema;

pub use schema::Config;

use crate::error::{PcacheError, PcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pcache")
            .join("config.toml")
    }

    /// Get the default cache root
    pub fn default_cache_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pcache")
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> PcacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> PcacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PcacheError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| PcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::validate(path, &config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> PcacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            PcacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    fn validate(path: &Path, config: &Config) -> PcacheResult<()> {
        let invalid = |reason: &str| PcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        match config.general.log_format.as_str() {
            "text" | "json" => {}
            _ => return Err(invalid("general.log_format must be \"text\" or \"json\"")),
        }
        if config.warm.chunk_kb == 0 {
            return Err(invalid("warm.chunk_kb must be at least 1"));
        }
        if config.warm.jobs == 0 {
            return Err(invalid("warm.jobs must be at least 1"));
        }
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> PcacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PcacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
