//! Durable payload storage
//!
//! Each cached file gets one sparse payload file per generation at
//! `blocks/<d[0..2]>/<d>.<generation>.data`, where `d` is the key digest.
//! Bytes live at their own file offsets, so disjoint writes never touch
//! each other and a torn write can only damage a region the index still
//! records as a gap.

use crate::cache::index::FileCacheEntry;
use crate::cache::key::FileKey;
use crate::cache::ranges::ByteRange;
use crate::cache::sync::{ensure_dir, sync_dir};
use crate::error::{PcacheError, PcacheResult};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

const PAYLOAD_EXT: &str = "data";

/// Payload storage rooted at `<cache-root>/blocks`
#[derive(Debug)]
pub struct BlockStore {
    dir: PathBuf,
}

impl BlockStore {
    /// Open (creating if needed) the block directory
    pub async fn open(dir: impl Into<PathBuf>) -> PcacheResult<Self> {
        let dir = dir.into();
        ensure_dir(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the payload file for one key generation
    pub fn payload_path(&self, key: &FileKey, generation: u64) -> PathBuf {
        let digest = key.digest();
        self.dir
            .join(&digest[..2])
            .join(format!("{}.{}.{}", digest, generation, PAYLOAD_EXT))
    }

    /// Store `bytes` at `offset` and make them durable before returning
    pub async fn write(
        &self,
        entry: &FileCacheEntry,
        offset: u64,
        bytes: &[u8],
    ) -> PcacheResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let path = self.payload_path(&entry.key, entry.generation);
        let shard = path
            .parent()
            .ok_or_else(|| PcacheError::Internal(format!("payload path {}", path.display())))?;
        ensure_dir(shard).await?;
        let created = !fs::try_exists(&path).await.unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| PcacheError::storage(format!("opening payload {}", path.display()), e))?;

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| PcacheError::storage(format!("seeking payload {}", path.display()), e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| PcacheError::storage(format!("writing payload {}", path.display()), e))?;
        file.sync_data()
            .await
            .map_err(|e| PcacheError::storage(format!("syncing payload {}", path.display()), e))?;
        if created {
            sync_dir(shard).await?;
        }

        debug!(
            "Stored {} bytes of {} at offset {}",
            bytes.len(),
            entry.key,
            offset
        );
        Ok(())
    }

    /// Read a range the entry's RangeSet records as cached
    ///
    /// Asking for bytes that are not recorded as cached, or finding fewer
    /// bytes on disk than recorded, is an inconsistency and never yields data.
    pub async fn read(
        &self,
        entry: &FileCacheEntry,
        offset: u64,
        length: u64,
    ) -> PcacheResult<Vec<u8>> {
        if !entry.ranges.covers(offset, length) {
            return Err(PcacheError::inconsistency(
                entry.key.as_str(),
                format!(
                    "read of {} outside cached ranges {}",
                    ByteRange::from_len(offset, length),
                    entry.ranges
                ),
            ));
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let path = self.payload_path(&entry.key, entry.generation);
        let mut file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PcacheError::inconsistency(
                    entry.key.as_str(),
                    format!("payload file {} is missing", path.display()),
                ))
            }
            Err(e) => {
                return Err(PcacheError::storage(
                    format!("opening payload {}", path.display()),
                    e,
                ))
            }
        };

        let len = usize::try_from(length)
            .map_err(|_| PcacheError::Internal(format!("read length {length} too large")))?;
        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| PcacheError::storage(format!("seeking payload {}", path.display()), e))?;
        match file.read_exact(&mut buf).await {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PcacheError::inconsistency(
                entry.key.as_str(),
                format!("payload file {} is shorter than recorded", path.display()),
            )),
            Err(e) => Err(PcacheError::storage(
                format!("reading payload {}", path.display()),
                e,
            )),
        }
    }

    /// Length of the payload file, `None` when it does not exist
    pub async fn payload_len(&self, key: &FileKey, generation: u64) -> PcacheResult<Option<u64>> {
        let path = self.payload_path(key, generation);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PcacheError::storage(
                format!("inspecting payload {}", path.display()),
                e,
            )),
        }
    }

    /// Remove the payload for one generation; failures only leave garbage behind
    pub async fn discard(&self, key: &FileKey, generation: u64) {
        let path = self.payload_path(key, generation);
        match fs::remove_file(&path).await {
            Ok(()) => debug!("Discarded payload {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to discard payload {}: {}", path.display(), e),
        }
    }

    /// Remove every payload generation stored for a key
    pub async fn discard_all(&self, key: &FileKey) -> PcacheResult<()> {
        let digest = key.digest();
        self.sweep_shard(&digest[..2], |name| {
            parse_payload_name(name).is_some_and(|(d, _)| d == digest)
        })
        .await
        .map(|_| ())
    }

    /// Remove payload files for which `keep(digest, generation)` is false
    ///
    /// Returns the number of files removed. Files that do not look like
    /// payloads are left alone.
    pub async fn retain<F>(&self, keep: F) -> PcacheResult<usize>
    where
        F: Fn(&str, u64) -> bool,
    {
        let mut removed = 0;
        for shard in self.shards().await? {
            removed += self
                .sweep_shard(&shard, |name| {
                    parse_payload_name(name).is_some_and(|(d, g)| !keep(d, g))
                })
                .await?;
        }
        Ok(removed)
    }

    /// Total bytes allocated to payload files
    pub async fn disk_usage(&self) -> PcacheResult<u64> {
        let mut total = 0;
        for shard in self.shards().await? {
            let dir = self.dir.join(&shard);
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| PcacheError::storage(format!("reading {}", dir.display()), e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PcacheError::storage("reading payload entry", e))?
            {
                if let Ok(meta) = entry.metadata().await {
                    total += allocated_bytes(&meta);
                }
            }
        }
        Ok(total)
    }

    async fn shards(&self) -> PcacheResult<Vec<String>> {
        let mut shards = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| PcacheError::storage(format!("reading {}", self.dir.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PcacheError::storage("reading block shard", e))?
        {
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                shards.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(shards)
    }

    async fn sweep_shard<F>(&self, shard: &str, remove: F) -> PcacheResult<usize>
    where
        F: Fn(&str) -> bool,
    {
        let dir = self.dir.join(shard);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(PcacheError::storage(format!("reading {}", dir.display()), e))
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PcacheError::storage("reading payload entry", e))?
        {
            let name = entry.file_name();
            if remove(&name.to_string_lossy()) {
                let path = entry.path();
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        debug!("Removed payload {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to remove payload {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }
}

/// Split `<digest>.<generation>.data` into its parts
fn parse_payload_name(name: &str) -> Option<(&str, u64)> {
    let stem = name.strip_suffix(PAYLOAD_EXT)?.strip_suffix('.')?;
    let (digest, generation) = stem.rsplit_once('.')?;
    Some((digest, generation.parse().ok()?))
}

#[cfg(unix)]
fn allocated_bytes(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_bytes(meta: &std::fs::Metadata) -> u64 {
    meta.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::ModificationToken;
    use crate::cache::ranges::RangeSet;
    use tempfile::TempDir;

    fn entry(path: &str, generation: u64, cached: &[(u64, u64)]) -> FileCacheEntry {
        let mut ranges = RangeSet::new();
        for &(s, e) in cached {
            ranges.mark_cached(s, e - s);
        }
        FileCacheEntry {
            key: FileKey::new(path).unwrap(),
            size: 1000,
            token: ModificationToken {
                len: 1000,
                modified: None,
            },
            generation,
            ranges,
            updated_at: chrono::Utc::now(),
        }
    }

    async fn store() -> (BlockStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = BlockStore::open(temp.path().join("blocks")).await.unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn write_then_read_at_offsets() {
        let (store, _temp) = store().await;
        let e = entry("/movie.mkv", 0, &[(100, 110), (500, 504)]);

        store.write(&e, 100, b"0123456789").await.unwrap();
        store.write(&e, 500, b"abcd").await.unwrap();

        assert_eq!(store.read(&e, 100, 10).await.unwrap(), b"0123456789");
        assert_eq!(store.read(&e, 103, 3).await.unwrap(), b"345");
        assert_eq!(store.read(&e, 500, 4).await.unwrap(), b"abcd");
        assert_eq!(store.payload_len(&e.key, 0).await.unwrap(), Some(504));
    }

    #[tokio::test]
    async fn read_outside_ranges_is_inconsistency() {
        let (store, _temp) = store().await;
        let e = entry("/a", 0, &[(0, 4)]);
        store.write(&e, 0, b"abcd").await.unwrap();

        let err = store.read(&e, 2, 4).await.unwrap_err();
        assert!(matches!(err, PcacheError::InternalInconsistency { .. }));
    }

    #[tokio::test]
    async fn missing_payload_is_inconsistency() {
        let (store, _temp) = store().await;
        let e = entry("/a", 0, &[(0, 4)]);

        let err = store.read(&e, 0, 4).await.unwrap_err();
        assert!(matches!(err, PcacheError::InternalInconsistency { .. }));
    }

    #[tokio::test]
    async fn short_payload_is_inconsistency() {
        let (store, _temp) = store().await;
        let e = entry("/a", 0, &[(0, 8)]);
        store.write(&e, 0, b"abcd").await.unwrap();

        let err = store.read(&e, 0, 8).await.unwrap_err();
        assert!(matches!(err, PcacheError::InternalInconsistency { .. }));
    }

    #[tokio::test]
    async fn generations_are_separate_files() {
        let (store, _temp) = store().await;
        let old = entry("/a", 0, &[(0, 4)]);
        let new = entry("/a", 1, &[(0, 4)]);
        store.write(&old, 0, b"old!").await.unwrap();
        store.write(&new, 0, b"new!").await.unwrap();

        store.discard(&old.key, 0).await;
        assert_eq!(store.payload_len(&old.key, 0).await.unwrap(), None);
        assert_eq!(store.read(&new, 0, 4).await.unwrap(), b"new!");

        store.discard_all(&new.key).await.unwrap();
        assert_eq!(store.payload_len(&new.key, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn retain_removes_unreferenced() {
        let (store, _temp) = store().await;
        let a = entry("/a", 3, &[(0, 1)]);
        let b = entry("/b", 0, &[(0, 1)]);
        store.write(&a, 0, b"x").await.unwrap();
        store.write(&b, 0, b"y").await.unwrap();

        let keep = a.key.digest();
        let removed = store.retain(|d, g| d == keep && g == 3).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.payload_len(&a.key, 3).await.unwrap(), Some(1));
        assert_eq!(store.payload_len(&b.key, 0).await.unwrap(), None);
    }

    #[test]
    fn payload_name_parsing() {
        assert_eq!(parse_payload_name("abc.7.data"), Some(("abc", 7)));
        assert_eq!(parse_payload_name("abc.data"), None);
        assert_eq!(parse_payload_name("abc.x.data"), None);
        assert_eq!(parse_payload_name("abc.7.tmp"), None);
    }
}
