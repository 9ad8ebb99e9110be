//! Settings shared by every command
//!
//! Flags win over the config file, which wins over built-in defaults.

use crate::backing::{BackingSource, LocalSource};
use crate::cache::{CacheEngine, CacheRoot, EngineOptions};
use crate::cli::args::Cli;
use crate::config::{Config, ConfigManager};
use crate::error::{PcacheError, PcacheResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolved settings for one invocation
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub cache_root: PathBuf,
    pub source: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(cli: &Cli, config: Config, config_path: PathBuf) -> Self {
        let cache_root = cli
            .cache_root
            .clone()
            .or_else(|| config.cache.root.clone())
            .unwrap_or_else(ConfigManager::default_cache_root);
        let source = cli.source.clone().or_else(|| config.source.root.clone());
        Self {
            config,
            config_path,
            cache_root,
            source,
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            revalidate: self.config.cache.revalidate,
        }
    }

    /// The configured backing directory
    pub fn backing_source(&self) -> PcacheResult<LocalSource> {
        let root = self.source.as_ref().ok_or(PcacheError::SourceNotConfigured)?;
        if !root.is_dir() {
            warn!("Backing source {} is not reachable", root.display());
        }
        Ok(LocalSource::new(root))
    }

    pub async fn open_root(&self) -> PcacheResult<CacheRoot> {
        CacheRoot::open(&self.cache_root).await
    }

    pub async fn open_engine(&self) -> PcacheResult<CacheEngine> {
        let source = self.backing_source()?;
        let root = self.open_root().await?;
        info!(
            "Caching {} in {} (revalidate: {})",
            source.describe(),
            root.path().display(),
            self.config.cache.revalidate
        );
        Ok(CacheEngine::new(
            Arc::new(root),
            Arc::new(source),
            self.engine_options(),
        ))
    }
}
