//! Cache root lifecycle
//!
//! The cache root is the only persistent state pcache owns. It is opened
//! once, shared by handle with the engine, and closed on shutdown.

use crate::cache::blocks::BlockStore;
use crate::cache::index::CacheIndex;
use crate::error::{PcacheError, PcacheResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

const INDEX_DIR: &str = "index";
const BLOCKS_DIR: &str = "blocks";

/// An opened cache root directory
#[derive(Debug)]
pub struct CacheRoot {
    path: PathBuf,
    index: CacheIndex,
    blocks: BlockStore,
}

impl CacheRoot {
    /// Open (creating if needed) a cache root and recover its index
    pub async fn open(path: impl Into<PathBuf>) -> PcacheResult<Self> {
        let path = path.into();
        fs::create_dir_all(&path)
            .await
            .map_err(|e| {
                PcacheError::storage(format!("creating cache root {}", path.display()), e)
            })?;

        let blocks = BlockStore::open(path.join(BLOCKS_DIR)).await?;
        let index = CacheIndex::open(path.join(INDEX_DIR), &blocks).await?;

        Ok(Self {
            path,
            index,
            blocks,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    /// Release the root
    ///
    /// Every commit is already durable when it returns, so there is nothing
    /// left to flush.
    pub async fn close(self) -> PcacheResult<()> {
        info!(
            "Closed cache root {} ({} entries)",
            self.path.display(),
            self.index.len()
        );
        Ok(())
    }

    /// Delete a cache root entirely; a missing root is not an error
    pub async fn clear(path: &Path) -> PcacheResult<bool> {
        match fs::remove_dir_all(path).await {
            Ok(()) => {
                info!("Removed cache root {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PcacheError::storage(
                format!("removing cache root {}", path.display()),
                e,
            )),
        }
    }
}
