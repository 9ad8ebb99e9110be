//! Read-only filesystem view over the cache
//!
//! The protocol-neutral half of a filesystem adapter. A kernel or network
//! frontend translates its requests into these calls and reports failures
//! with [`PcacheError::errno`].

use crate::cache::{CacheEngine, FileKey, ModificationToken};
use crate::error::{PcacheError, PcacheResult};
use tracing::debug;

/// Attributes reported for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    pub size: u64,
    pub token: ModificationToken,
    /// Permission bits; always read-only
    pub mode: u32,
}

const READ_ONLY_MODE: u32 = 0o444;

/// Read-only view of the backing source through a `CacheEngine`
#[derive(Clone)]
pub struct ReadOnlyView {
    engine: CacheEngine,
}

impl ReadOnlyView {
    pub fn new(engine: CacheEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    /// Map a request path onto a cache key
    pub fn resolve(&self, path: &str) -> PcacheResult<FileKey> {
        FileKey::new(path)
    }

    /// Refuse any open that could modify the file
    pub fn check_open(&self, path: &str, flags: i32) -> PcacheResult<()> {
        let write_flags = libc::O_TRUNC | libc::O_APPEND | libc::O_CREAT;
        if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & write_flags != 0 {
            debug!("Refusing open of {} with flags {:#o}", path, flags);
            return Err(PcacheError::ReadOnly(path.to_string()));
        }
        Ok(())
    }

    pub async fn getattr(&self, path: &str) -> PcacheResult<FileAttr> {
        let key = self.resolve(path)?;
        let stat = self.engine.stat(&key).await?;
        Ok(FileAttr {
            size: stat.size,
            token: stat.token,
            mode: READ_ONLY_MODE,
        })
    }

    pub async fn read(&self, path: &str, offset: u64, size: u64) -> PcacheResult<Vec<u8>> {
        let key = self.resolve(path)?;
        self.engine.serve_read(&key, offset, size).await
    }
}
