//! Backing source over a local (or locally mounted) directory

use super::{BackingError, BackingSource};
use crate::cache::key::{FileKey, ModificationToken, SourceStat};
use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Mirrors the files under `root`
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_err(key: &FileKey, e: std::io::Error) -> BackingError {
        if e.kind() == ErrorKind::NotFound {
            BackingError::NotFound(key.clone())
        } else {
            BackingError::unreachable(key, &e)
        }
    }
}

#[async_trait]
impl BackingSource for LocalSource {
    async fn stat(&self, key: &FileKey) -> Result<SourceStat, BackingError> {
        let path = key.to_path(&self.root);
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        if !meta.is_file() {
            return Err(BackingError::NotAFile(key.clone()));
        }
        Ok(SourceStat {
            size: meta.len(),
            token: ModificationToken::from_metadata(&meta),
        })
    }

    async fn read(
        &self,
        key: &FileKey,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, BackingError> {
        let path = key.to_path(&self.root);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| BackingError::unreachable(key, &e))?;

        let mut buf = Vec::new();
        file.take(length)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| BackingError::unreachable(key, &e))?;

        debug!("Backing read {} [{}, +{}) -> {} bytes", key, offset, length, buf.len());
        Ok(buf)
    }

    fn describe(&self) -> String {
        format!("local directory {}", self.root.display())
    }
}
