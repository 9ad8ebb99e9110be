//! Directory durability helpers
//!
//! A synced file is not enough after a create or rename: the directory
//! entry naming it must be synced too, or a crash can bring back the old
//! name (or none).

use crate::error::{PcacheError, PcacheResult};
use std::path::Path;
use tokio::fs;

/// Sync a directory so its entries survive a crash
#[cfg(unix)]
pub(crate) async fn sync_dir(dir: &Path) -> PcacheResult<()> {
    let handle = fs::File::open(dir)
        .await
        .map_err(|e| PcacheError::storage(format!("opening {}", dir.display()), e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| PcacheError::storage(format!("syncing {}", dir.display()), e))
}

#[cfg(not(unix))]
pub(crate) async fn sync_dir(_dir: &Path) -> PcacheResult<()> {
    Ok(())
}

/// Create a shard directory if missing and sync its parent
pub(crate) async fn ensure_dir(dir: &Path) -> PcacheResult<()> {
    if fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }
    fs::create_dir_all(dir)
        .await
        .map_err(|e| PcacheError::storage(format!("creating {}", dir.display()), e))?;
    if let Some(parent) = dir.parent() {
        sync_dir(parent).await?;
    }
    Ok(())
}
