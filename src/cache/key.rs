//! File identity and change detection
//!
//! A `FileKey` is the normalised path of a file relative to the backing
//! root. Two spellings of the same path (`/a//b`, `/a/./b`) resolve to the
//! same key; anything that could escape the root is rejected.

use crate::error::{PcacheError, PcacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable identity of a backing file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileKey(String);

impl FileKey {
    /// Normalise a slash-separated path into a key
    ///
    /// A missing leading slash is tolerated; `..` and NUL bytes are not.
    pub fn new(path: &str) -> PcacheResult<Self> {
        if path.contains('\0') {
            return Err(PcacheError::PathInvalid {
                path: path.escape_default().to_string(),
                reason: "contains a NUL byte".to_string(),
            });
        }

        let mut parts = Vec::new();
        for part in path.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(PcacheError::PathInvalid {
                        path: path.to_string(),
                        reason: "parent directory components are not allowed".to_string(),
                    })
                }
                other => parts.push(other),
            }
        }

        if parts.is_empty() {
            return Err(PcacheError::PathInvalid {
                path: path.to_string(),
                reason: "does not name a file".to_string(),
            });
        }

        Ok(Self(format!("/{}", parts.join("/"))))
    }

    /// The normalised path, always starting with `/`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA256 hex digest used to name on-disk state for this key
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Join this key onto a backing root directory
    pub fn to_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0[1..])
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FileKey {
    type Error = PcacheError;

    fn try_from(value: String) -> PcacheResult<Self> {
        let key = Self::new(&value)?;
        if key.0 != value {
            return Err(PcacheError::PathInvalid {
                path: value,
                reason: "not in normalised form".to_string(),
            });
        }
        Ok(key)
    }
}

impl From<FileKey> for String {
    fn from(key: FileKey) -> Self {
        key.0
    }
}

/// Value compared against the cached one to detect a changed backing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationToken {
    /// File length when observed
    pub len: u64,

    /// Last modification time, when the source reports one
    pub modified: Option<DateTime<Utc>>,
}

impl ModificationToken {
    /// Build a token from local filesystem metadata
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            len: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        }
    }
}

impl fmt::Display for ModificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modified {
            Some(ts) => write!(f, "{}@{}", self.len, ts.to_rfc3339()),
            None => write!(f, "{}@?", self.len),
        }
    }
}

/// Result of a backing `stat`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStat {
    /// Current size in bytes
    pub size: u64,

    /// Change-detection token
    pub token: ModificationToken,
}
