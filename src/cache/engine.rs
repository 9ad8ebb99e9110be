//! Read orchestration
//!
//! `serve_read` turns a logical read into cached segments and gaps, fetches
//! the gaps from the backing source, makes them durable, commits the new
//! coverage and returns the bytes in offset order.
//!
//! # Concurrency
//!
//! - One async mutex per `FileKey` guards the whole lookup/fetch/commit
//!   sequence, so overlapping reads of one file fetch each gap once; the
//!   second reader sees the first reader's result as cached.
//! - Different files never share a lock.
//! - Each read runs on its own spawned task. A caller that gives up stops
//!   waiting, but the fill it started still completes and commits, and
//!   readers queued behind it are released normally.
//!
//! # Commit order
//!
//! 1. Fetch every gap of the request (no state touched yet)
//! 2. Write and sync every payload
//! 3. Mark the gaps cached and persist the index record once

use crate::backing::{BackingError, BackingSource};
use crate::cache::index::{FileCacheEntry, Freshness};
use crate::cache::key::{FileKey, SourceStat};
use crate::cache::locks::KeyedLocks;
use crate::cache::ranges::{ByteRange, Segment};
use crate::cache::root::CacheRoot;
use crate::error::{PcacheError, PcacheResult};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Times `warm` starts over on a file that keeps changing
const MAX_WARM_RESTARTS: u32 = 3;

/// Engine behaviour switches
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Stat the backing file on every read to detect changes.
    ///
    /// When off, a known file is served from its cached metadata without
    /// contacting the backing source until a gap needs fetching.
    pub revalidate: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { revalidate: true }
    }
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Completed `serve_read` calls
    pub reads: u64,
    /// Backing `read` calls issued
    pub backing_fetches: u64,
    /// Bytes returned by the backing source
    pub bytes_fetched: u64,
    /// Bytes served from the block store
    pub bytes_from_cache: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    backing_fetches: AtomicU64,
    bytes_fetched: AtomicU64,
    bytes_from_cache: AtomicU64,
}

/// How much of a file is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub cached: u64,
    pub size: u64,
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        self.cached >= self.size
    }

    pub fn percent(&self) -> f64 {
        if self.size == 0 {
            return 100.0;
        }
        self.cached as f64 / self.size as f64 * 100.0
    }
}

/// Range-aware read-through cache over one backing source
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<Inner>,
}

struct Inner {
    root: Arc<CacheRoot>,
    source: Arc<dyn BackingSource>,
    locks: KeyedLocks<FileKey>,
    options: EngineOptions,
    counters: Counters,
}

impl CacheEngine {
    pub fn new(
        root: Arc<CacheRoot>,
        source: Arc<dyn BackingSource>,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                root,
                source,
                locks: KeyedLocks::new(),
                options,
                counters: Counters::default(),
            }),
        }
    }

    pub fn root(&self) -> &CacheRoot {
        &self.inner.root
    }

    /// Read `[offset, offset + length)` of a file through the cache
    ///
    /// The range is clamped to the file size. Fails with
    /// `BackingUnavailable` (nothing changed, retry later), `NotFound` and
    /// `ShortRead` (entry invalidated), or `InternalInconsistency`.
    pub async fn serve_read(
        &self,
        key: &FileKey,
        offset: u64,
        length: u64,
    ) -> PcacheResult<Vec<u8>> {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        tokio::spawn(async move { inner.serve_read(&task_key, offset, length).await })
            .await
            .map_err(|e| PcacheError::Internal(format!("read task for {} failed: {}", key, e)))?
    }

    /// Size and token of a file, from the cache when revalidation is off
    pub async fn stat(&self, key: &FileKey) -> PcacheResult<SourceStat> {
        if !self.inner.options.revalidate {
            if let Some(entry) = self.inner.root.index().lookup(key) {
                return Ok(SourceStat {
                    size: entry.size,
                    token: entry.token,
                });
            }
        }
        match self.inner.source.stat(key).await {
            Ok(stat) => Ok(stat),
            Err(err @ (BackingError::NotFound(_) | BackingError::NotAFile(_))) => {
                let _guard = self.inner.locks.lock(key).await;
                self.inner.drop_entry(key).await;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pull a whole file into the cache in `chunk`-sized reads
    ///
    /// `on_progress(done, total)` is called after each chunk. Chunks the
    /// index already covers are skipped. If the file changes underneath,
    /// warming starts over on the new generation. Returns the bytes cached.
    pub async fn warm<F>(
        &self,
        key: &FileKey,
        chunk: u64,
        mut on_progress: F,
    ) -> PcacheResult<u64>
    where
        F: FnMut(u64, u64),
    {
        let chunk = chunk.max(1);
        // A zero-length read refreshes metadata without fetching anything.
        self.serve_read(key, 0, 0).await?;

        let mut generation = None;
        let mut restarts = 0;
        let mut offset = 0;
        loop {
            let Some(entry) = self.inner.root.index().lookup(key) else {
                return Err(PcacheError::inconsistency(
                    key.as_str(),
                    "entry vanished while warming",
                ));
            };
            if generation.is_some_and(|g| g != entry.generation) {
                restarts += 1;
                if restarts > MAX_WARM_RESTARTS {
                    return Err(PcacheError::BackingUnavailable {
                        key: key.to_string(),
                        reason: "file kept changing while warming".to_string(),
                    });
                }
                info!("{} changed while warming, starting over", key);
                offset = 0;
            }
            generation = Some(entry.generation);

            if offset >= entry.size {
                let cached = entry.ranges.cached_bytes();
                if !entry.is_complete() {
                    return Err(PcacheError::inconsistency(
                        key.as_str(),
                        format!("warm ended with {} of {} bytes cached", cached, entry.size),
                    ));
                }
                on_progress(entry.size, entry.size);
                return Ok(cached);
            }

            let len = chunk.min(entry.size - offset);
            if !entry.ranges.covers(offset, len) {
                self.serve_read(key, offset, len).await?;
            }
            offset += len;
            on_progress(offset.min(entry.size), entry.size);
        }
    }

    /// Cached bytes versus known size, from the index only
    pub fn coverage(&self, key: &FileKey) -> Option<Coverage> {
        self.inner.root.index().lookup(key).map(|e| Coverage {
            cached: e.ranges.cached_bytes(),
            size: e.size,
        })
    }

    /// Drop everything cached for one file
    pub async fn forget(&self, key: &FileKey) -> PcacheResult<bool> {
        let _guard = self.inner.locks.lock(key).await;
        self.inner.invalidate_entry(key).await
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            reads: c.reads.load(Ordering::Relaxed),
            backing_fetches: c.backing_fetches.load(Ordering::Relaxed),
            bytes_fetched: c.bytes_fetched.load(Ordering::Relaxed),
            bytes_from_cache: c.bytes_from_cache.load(Ordering::Relaxed),
        }
    }

    /// Release the engine and close the cache root if nothing else holds it
    pub async fn close(self) -> PcacheResult<()> {
        let Ok(inner) = Arc::try_unwrap(self.inner) else {
            debug!("Engine still shared, leaving cache root open");
            return Ok(());
        };
        match Arc::try_unwrap(inner.root) {
            Ok(root) => root.close().await,
            Err(_) => {
                debug!("Cache root still shared, not closing");
                Ok(())
            }
        }
    }
}

impl Inner {
    async fn serve_read(&self, key: &FileKey, offset: u64, length: u64) -> PcacheResult<Vec<u8>> {
        let _guard = self.locks.lock(key).await;
        let mut entry = self.resolve(key).await?;

        let end = offset.saturating_add(length).min(entry.size);
        if offset >= end {
            debug!(
                "Read {} at {} (+{}) is empty after clamping to {}",
                key, offset, length, entry.size
            );
            self.counters.reads.fetch_add(1, Ordering::Relaxed);
            return Ok(Vec::new());
        }
        let window = ByteRange::new(offset, end);
        let segments = entry.ranges.query(window.start, window.len());
        debug!("Read {} {} -> {} segment(s)", key, window, segments.len());

        let mut fetched = Vec::new();
        for gap in segments.iter().filter(|s| s.is_gap()).map(Segment::range) {
            let bytes = self.fetch_gap(&entry, gap).await?;
            fetched.push((gap, bytes));
        }

        if !fetched.is_empty() {
            for (gap, bytes) in &fetched {
                self.root.blocks().write(&entry, gap.start, bytes).await?;
            }
            for (gap, _) in &fetched {
                entry.ranges.mark_cached(gap.start, gap.len());
            }
            entry.updated_at = Utc::now();
            self.root.index().persist(&entry).await?;
        }

        let capacity = usize::try_from(window.len())
            .map_err(|_| PcacheError::Internal(format!("read of {window} is too large")))?;
        let mut out = Vec::with_capacity(capacity);
        let mut fetched = fetched.into_iter();
        for segment in segments {
            match segment {
                Segment::Cached(r) => {
                    let bytes = self.root.blocks().read(&entry, r.start, r.len()).await?;
                    self.counters
                        .bytes_from_cache
                        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    out.extend_from_slice(&bytes);
                }
                Segment::Gap(r) => {
                    let (gap, bytes) = fetched.next().ok_or_else(|| {
                        let reason = format!("no fetched bytes for gap {r}");
                        PcacheError::inconsistency(key.as_str(), reason)
                    })?;
                    debug_assert_eq!(gap, r);
                    out.extend_from_slice(&bytes);
                }
            }
        }

        self.counters.reads.fetch_add(1, Ordering::Relaxed);
        Ok(out)
    }

    /// Current entry for a key, refreshed against the backing source
    async fn resolve(&self, key: &FileKey) -> PcacheResult<FileCacheEntry> {
        if !self.options.revalidate {
            if let Some(entry) = self.root.index().lookup(key) {
                return Ok(entry);
            }
        }

        let stat = match self.source.stat(key).await {
            Ok(stat) => stat,
            Err(err @ (BackingError::NotFound(_) | BackingError::NotAFile(_))) => {
                self.drop_entry(key).await;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let (entry, freshness) = self.root.index().get_or_create(key, &stat).await?;
        match freshness {
            Freshness::Current => {}
            Freshness::Created => {
                // Leftovers from an entry whose record was lost.
                if let Err(e) = self.root.blocks().discard_all(key).await {
                    warn!("Failed to clear old payload for {}: {}", key, e);
                }
            }
            Freshness::Invalidated { stale_generation } => {
                self.root.blocks().discard(key, stale_generation).await;
            }
        }
        Ok(entry)
    }

    /// Fetch exactly one gap; a short answer invalidates the file
    async fn fetch_gap(&self, entry: &FileCacheEntry, gap: ByteRange) -> PcacheResult<Vec<u8>> {
        let key = &entry.key;
        let mut bytes = match self.source.read(key, gap.start, gap.len()).await {
            Ok(bytes) => bytes,
            Err(err @ BackingError::Unreachable { .. }) => {
                warn!("Fetch of {} {} failed: {}", key, gap, err);
                return Err(err.into());
            }
            Err(err) => {
                warn!("Fetch of {} {} failed, invalidating: {}", key, gap, err);
                self.drop_entry(key).await;
                return Err(err.into());
            }
        };

        self.counters.backing_fetches.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_fetched
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        let got = bytes.len() as u64;
        if got < gap.len() {
            warn!(
                "Short read of {} {}: got {} bytes, invalidating",
                key, gap, got
            );
            self.drop_entry(key).await;
            return Err(PcacheError::ShortRead {
                key: key.to_string(),
                offset: gap.start,
                expected: gap.len(),
                actual: got,
            });
        }
        bytes.truncate(gap.len() as usize);

        debug!("Fetched {} {}", key, gap);
        Ok(bytes)
    }

    async fn invalidate_entry(&self, key: &FileKey) -> PcacheResult<bool> {
        match self.root.index().invalidate(key).await? {
            Some(old) => {
                self.root.blocks().discard(key, old.generation).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Invalidate on an error path, where the original error is what matters
    async fn drop_entry(&self, key: &FileKey) {
        if let Err(e) = self.invalidate_entry(key).await {
            warn!("Failed to invalidate {}: {}", key, e);
        }
    }
}
