//! Error types for pcache
//!
//! All modules use `PcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pcache operations
pub type PcacheResult<T> = Result<T, PcacheError>;

/// All errors that can occur in pcache
#[derive(Error, Debug)]
pub enum PcacheError {
    // Backing source errors
    #[error("Backing source unavailable for {key}: {reason}")]
    BackingUnavailable { key: String, reason: String },

    #[error("Backing file not found: {0}")]
    NotFound(String),

    #[error("Not a regular file: {0}")]
    NotAFile(String),

    #[error("Short read from backing source for {key} at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        key: String,
        offset: u64,
        expected: u64,
        actual: u64,
    },

    // Cache errors
    #[error("Cache inconsistency for {key}: {reason}")]
    InternalInconsistency { key: String, reason: String },

    #[error("Cache storage failure: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read-only filesystem: {0}")]
    ReadOnly(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No backing source configured")]
    SourceNotConfigured,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: String, reason: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a cache storage error with context
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Create an internal inconsistency error for a cached file
    pub fn inconsistency(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InternalInconsistency {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Retryable errors leave the cache untouched, so the same read can be
    /// issued again once the cause clears.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackingUnavailable { .. } | Self::Storage { .. })
    }

    /// Map the error onto the errno a filesystem adapter should return
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::NotAFile(_) => libc::EISDIR,
            Self::BackingUnavailable { .. } => libc::EAGAIN,
            Self::Storage { source, .. } if source.raw_os_error() == Some(libc::ENOSPC) => {
                libc::ENOSPC
            }
            Self::ReadOnly(_) => libc::EACCES,
            Self::PathInvalid { .. } => libc::EINVAL,
            _ => libc::EIO,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SourceNotConfigured => {
                Some("Pass --source <DIR> or set [source] root in the config file")
            }
            Self::BackingUnavailable { .. } => {
                Some("Check that the backing filesystem is reachable, then retry")
            }
            Self::InternalInconsistency { .. } => {
                Some("Run: pcache forget <path> to drop the damaged entry")
            }
            Self::Storage { .. } => Some("Check free space on the cache device"),
            _ => None,
        }
    }
}
