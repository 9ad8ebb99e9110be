//! Durable per-file cache metadata
//!
//! One JSON record per key lives at `index/<d[0..2]>/<d>.json`. Records are
//! written to a temporary sibling, synced, then renamed into place, so a
//! crash leaves either the old record or the new one.
//!
//! Opening the index runs recovery: records that fail to parse, belong to a
//! different key than their file name says, break RangeSet invariants, or
//! describe payload that is not on disk are dropped. The affected keys are
//! simply treated as never seen.

use crate::cache::blocks::BlockStore;
use crate::cache::key::{FileKey, ModificationToken, SourceStat};
use crate::cache::ranges::RangeSet;
use crate::cache::sync::{ensure_dir, sync_dir};
use crate::error::{PcacheError, PcacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// On-disk record format version
pub const INDEX_FORMAT: u32 = 1;

const RECORD_EXT: &str = "json";
const TMP_EXT: &str = "json.tmp";

/// Cached state of one backing file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCacheEntry {
    /// Backing file identity
    pub key: FileKey,

    /// Size of the backing file when last observed
    pub size: u64,

    /// Change-detection token when last observed
    pub token: ModificationToken,

    /// Payload generation; bumped whenever the entry is invalidated
    pub generation: u64,

    /// Byte intervals present in the block store
    pub ranges: RangeSet,

    /// When this record was last committed
    pub updated_at: DateTime<Utc>,
}

impl FileCacheEntry {
    /// Fresh, empty entry for a newly observed file
    pub fn new(key: FileKey, stat: &SourceStat, generation: u64) -> Self {
        Self {
            key,
            size: stat.size,
            token: stat.token.clone(),
            generation,
            ranges: RangeSet::new(),
            updated_at: Utc::now(),
        }
    }

    /// Fraction of the file that is cached, in `[0, 1]`
    pub fn coverage(&self) -> f64 {
        if self.size == 0 {
            return 1.0;
        }
        self.ranges.cached_bytes() as f64 / self.size as f64
    }

    pub fn is_complete(&self) -> bool {
        self.ranges.is_complete(self.size)
    }
}

/// Serialized form, carrying the format version alongside the entry
#[derive(Serialize, Deserialize)]
struct Record {
    format: u32,
    #[serde(flatten)]
    entry: FileCacheEntry,
}

/// What `get_or_create` found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Existing entry whose token matches
    Current,
    /// No entry existed; a new empty one was created
    Created,
    /// Token differed; the entry was reset and this generation is now garbage
    Invalidated { stale_generation: u64 },
}

/// Persistent collection of `FileCacheEntry` records
#[derive(Debug)]
pub struct CacheIndex {
    dir: PathBuf,
    entries: Mutex<HashMap<FileKey, FileCacheEntry>>,
}

impl CacheIndex {
    /// Open the index, recovering from any unclean shutdown
    ///
    /// Payload files not referenced by a surviving record are removed.
    pub async fn open(dir: impl Into<PathBuf>, blocks: &BlockStore) -> PcacheResult<Self> {
        let dir = dir.into();
        ensure_dir(&dir).await?;

        let mut entries = HashMap::new();
        for path in record_files(&dir).await? {
            match load_record(&path, blocks).await {
                Ok(entry) => {
                    entries.insert(entry.key.clone(), entry);
                }
                Err(reason) => {
                    warn!("Discarding index record {}: {}", path.display(), reason);
                    remove_if_exists(&path).await;
                }
            }
        }

        let live: HashSet<(String, u64)> = entries
            .values()
            .map(|e| (e.key.digest(), e.generation))
            .collect();
        let swept = blocks
            .retain(|digest, generation| live.contains(&(digest.to_string(), generation)))
            .await?;
        if swept > 0 {
            info!("Removed {} unreferenced payload file(s)", swept);
        }

        info!(
            "Opened cache index at {} with {} entries",
            dir.display(),
            entries.len()
        );
        Ok(Self {
            dir,
            entries: Mutex::new(entries),
        })
    }

    /// Current entry for a key, if any
    pub fn lookup(&self, key: &FileKey) -> Option<FileCacheEntry> {
        self.lock().get(key).cloned()
    }

    /// Entry for `key`, created or reset to match `stat`
    ///
    /// A token mismatch resets the RangeSet and moves the entry to a new
    /// generation, so the old payload can never be served again.
    pub async fn get_or_create(
        &self,
        key: &FileKey,
        stat: &SourceStat,
    ) -> PcacheResult<(FileCacheEntry, Freshness)> {
        let existing = self.lookup(key);
        let (entry, freshness) = match existing {
            Some(entry) if entry.token == stat.token => return Ok((entry, Freshness::Current)),
            Some(stale) => {
                info!(
                    "Backing file {} changed ({} -> {}), invalidating",
                    key, stale.token, stat.token
                );
                let fresh = FileCacheEntry::new(key.clone(), stat, stale.generation + 1);
                (
                    fresh,
                    Freshness::Invalidated {
                        stale_generation: stale.generation,
                    },
                )
            }
            None => {
                debug!("New cache entry for {}", key);
                (FileCacheEntry::new(key.clone(), stat, 0), Freshness::Created)
            }
        };

        self.persist(&entry).await?;
        Ok((entry, freshness))
    }

    /// Durably write an entry and make it the current one
    pub async fn persist(&self, entry: &FileCacheEntry) -> PcacheResult<()> {
        let path = self.record_path(&entry.key);
        let tmp = path.with_extension(TMP_EXT);
        let shard = path
            .parent()
            .ok_or_else(|| PcacheError::Internal(format!("record path {}", path.display())))?;
        ensure_dir(shard).await?;

        let record = Record {
            format: INDEX_FORMAT,
            entry: entry.clone(),
        };
        let content = serde_json::to_vec(&record)?;

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| PcacheError::storage(format!("creating {}", tmp.display()), e))?;
        file.write_all(&content)
            .await
            .map_err(|e| PcacheError::storage(format!("writing {}", tmp.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| PcacheError::storage(format!("syncing {}", tmp.display()), e))?;
        drop(file);

        fs::rename(&tmp, &path)
            .await
            .map_err(|e| PcacheError::storage(format!("committing {}", path.display()), e))?;
        sync_dir(shard).await?;

        self.lock().insert(entry.key.clone(), entry.clone());
        debug!("Committed {} ranges {}", entry.key, entry.ranges);
        Ok(())
    }

    /// Drop a key's record, returning the entry it held
    pub async fn invalidate(&self, key: &FileKey) -> PcacheResult<Option<FileCacheEntry>> {
        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PcacheError::storage(
                    format!("removing {}", path.display()),
                    e,
                ))
            }
        }
        let old = self.lock().remove(key);
        if old.is_some() {
            info!("Invalidated cache entry for {}", key);
        }
        Ok(old)
    }

    /// Snapshot of every entry, sorted by key
    pub fn entries(&self) -> Vec<FileCacheEntry> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &FileKey) -> PathBuf {
        let digest = key.digest();
        self.dir
            .join(&digest[..2])
            .join(format!("{}.{}", digest, RECORD_EXT))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FileKey, FileCacheEntry>> {
        // Never held across an await, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// All `*.json` record files (temporary files from a crash are removed)
async fn record_files(dir: &Path) -> PcacheResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut shards = fs::read_dir(dir)
        .await
        .map_err(|e| PcacheError::storage(format!("reading {}", dir.display()), e))?;

    while let Some(shard) = shards
        .next_entry()
        .await
        .map_err(|e| PcacheError::storage("reading index shard", e))?
    {
        if !shard.file_type().await.is_ok_and(|t| t.is_dir()) {
            continue;
        }
        let mut records = fs::read_dir(shard.path())
            .await
            .map_err(|e| PcacheError::storage(format!("reading {}", shard.path().display()), e))?;
        while let Some(record) = records
            .next_entry()
            .await
            .map_err(|e| PcacheError::storage("reading index record", e))?
        {
            let path = record.path();
            let name = record.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_EXT) {
                debug!("Removing interrupted record write {}", path.display());
                remove_if_exists(&path).await;
            } else if path.extension().is_some_and(|ext| ext == RECORD_EXT) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Parse and validate one record; the error string says why it was rejected
async fn load_record(path: &Path, blocks: &BlockStore) -> Result<FileCacheEntry, String> {
    let content = fs::read(path).await.map_err(|e| e.to_string())?;
    let record: Record = serde_json::from_slice(&content).map_err(|e| e.to_string())?;
    if record.format != INDEX_FORMAT {
        return Err(format!("unsupported format {}", record.format));
    }

    let entry = record.entry;
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    if stem.as_deref() != Some(entry.key.digest().as_str()) {
        return Err(format!("record names key {} which does not match its file", entry.key));
    }
    if entry.ranges.max_end() > entry.size {
        return Err(format!(
            "ranges {} extend past file size {}",
            entry.ranges, entry.size
        ));
    }

    if !entry.ranges.is_empty() {
        let on_disk = blocks
            .payload_len(&entry.key, entry.generation)
            .await
            .map_err(|e| e.to_string())?;
        match on_disk {
            Some(len) if len >= entry.ranges.max_end() => {}
            Some(len) => {
                return Err(format!(
                    "payload holds {} bytes but ranges reach {}",
                    len,
                    entry.ranges.max_end()
                ))
            }
            None => return Err("payload file is missing".to_string()),
        }
    }

    Ok(entry)
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
