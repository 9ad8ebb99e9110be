//! Per-key exclusion
//!
//! Readers of the same file queue on one async mutex; readers of different
//! files never touch each other's lock. Slots are held weakly, so a key's
//! mutex disappears once nobody holds or awaits it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Prune dead slots once the table grows past this many entries
const CLEANUP_THRESHOLD: usize = 4096;

/// Table of lazily created per-key async mutexes
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    slots: DashMap<K, Weak<Mutex<()>>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`
    ///
    /// The returned guard releases the key when dropped, on every exit path.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        if let Some(lock) = self.slots.get(key).and_then(|w| w.value().upgrade()) {
            return lock;
        }

        // The entry holds its shard's write lock, so two callers that both
        // missed above still end up sharing one mutex.
        let lock = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    slot.insert(Arc::downgrade(&lock));
                    lock
                }
            },
            Entry::Vacant(slot) => {
                let lock = Arc::new(Mutex::new(()));
                slot.insert(Arc::downgrade(&lock));
                lock
            }
        };

        if self.slots.len() > CLEANUP_THRESHOLD {
            self.slots.retain(|_, w| w.strong_count() > 0);
        }
        lock
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
