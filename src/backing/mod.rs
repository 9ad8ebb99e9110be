//! Backing source abstraction
//!
//! The cache never assumes anything about where bytes come from. Any
//! source that can `stat` and `read` a key works: a local directory, a
//! network client, or another mounted cache.

mod local;

pub use local::LocalSource;

use crate::cache::key::{FileKey, SourceStat};
use crate::error::PcacheError;
use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a backing source
#[derive(Error, Debug)]
pub enum BackingError {
    #[error("{0} does not exist")]
    NotFound(FileKey),

    #[error("{0} is not a regular file")]
    NotAFile(FileKey),

    #[error("{key} is unreachable: {reason}")]
    Unreachable { key: FileKey, reason: String },

    #[error("{key}: read at {offset} returned {actual} of {expected} bytes")]
    ShortRead {
        key: FileKey,
        offset: u64,
        expected: u64,
        actual: u64,
    },
}

impl BackingError {
    /// Unreachable error from an IO failure
    pub fn unreachable(key: &FileKey, source: &std::io::Error) -> Self {
        Self::Unreachable {
            key: key.clone(),
            reason: source.to_string(),
        }
    }
}

impl From<BackingError> for PcacheError {
    fn from(err: BackingError) -> Self {
        match err {
            BackingError::NotFound(key) => PcacheError::NotFound(key.to_string()),
            BackingError::NotAFile(key) => PcacheError::NotAFile(key.to_string()),
            BackingError::Unreachable { key, reason } => PcacheError::BackingUnavailable {
                key: key.to_string(),
                reason,
            },
            BackingError::ShortRead {
                key,
                offset,
                expected,
                actual,
            } => PcacheError::ShortRead {
                key: key.to_string(),
                offset,
                expected,
                actual,
            },
        }
    }
}

/// Capability interface over the slow filesystem being cached
#[async_trait]
pub trait BackingSource: Send + Sync {
    /// Current size and modification token of a file
    async fn stat(&self, key: &FileKey) -> Result<SourceStat, BackingError>;

    /// Read up to `length` bytes at `offset`
    ///
    /// Returning fewer bytes than asked for is allowed; the cache decides
    /// whether that is an end-of-file or an inconsistency.
    async fn read(&self, key: &FileKey, offset: u64, length: u64)
        -> Result<Vec<u8>, BackingError>;

    /// Human-readable description for logs and status output
    fn describe(&self) -> String;
}
