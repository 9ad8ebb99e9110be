//! Configuration schema for pcache
//!
//! Configuration is stored at `~/.config/pcache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache storage settings
    pub cache: CacheConfig,

    /// Backing source settings
    pub source: SourceConfig,

    /// Defaults for `pcache warm`
    pub warm: WarmConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory; the platform cache dir when unset
    pub root: Option<PathBuf>,

    /// Stat the backing file on every read to detect changes
    pub revalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            revalidate: true,
        }
    }
}

/// Backing source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory whose files are cached
    pub root: Option<PathBuf>,
}

/// Warm command defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmConfig {
    /// Size of each read issued while warming, in KiB
    pub chunk_kb: u64,

    /// Files warmed concurrently
    pub jobs: usize,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            chunk_kb: 1024,
            jobs: 4,
        }
    }
}
