//! Persistent range-aware read cache
//!
//! Caches arbitrary byte ranges of files from a slow backing source and
//! serves later reads of those ranges locally, across restarts.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   index/<d[0..2]>/<d>.json          one record per file
//!   blocks/<d[0..2]>/<d>.<gen>.data   sparse payload, real file offsets
//! ```
//!
//! `d` is the SHA256 hex digest of the file key. A payload byte is only
//! ever read when its record says the range is cached, and a record never
//! claims a range before the payload for it has been synced.
//!
//! # Generations
//!
//! When a backing file changes, its entry moves to a new generation with
//! an empty range set. Payload for older generations is unreachable and is
//! removed eagerly, or swept on the next open.

pub mod blocks;
pub mod engine;
pub mod index;
pub mod key;
pub mod locks;
pub mod ranges;
pub mod root;
mod sync;

pub use blocks::BlockStore;
pub use engine::{CacheEngine, Coverage, EngineOptions, EngineStats};
pub use index::{CacheIndex, FileCacheEntry, Freshness};
pub use key::{FileKey, ModificationToken, SourceStat};
pub use ranges::{ByteRange, RangeSet, Segment};
pub use root::CacheRoot;
