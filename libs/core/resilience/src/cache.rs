//! In-process TTL cache.
//!
//! Backs the query-engine result memoisation and the analysis pipeline's
//! shared snapshot. Semantics are deliberately simple: last writer wins,
//! expiry is checked (and the entry evicted) at read time, and values are
//! cloned out so readers never hold the lock across their own work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A thread-safe map with per-entry expiry.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    default_ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries expire after `default_ttl` unless a
    /// per-entry TTL is given.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Fetch a live value. Expired entries are evicted and report a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: upgrade to a write lock and drop the entry.
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at <= Instant::now() {
                entries.remove(key);
            } else {
                // Another writer refreshed it between the locks.
                return Some(entry.value.clone());
            }
        }
        None
    }

    /// Insert with the default TTL.
    pub fn put(&self, key: K, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop a single entry.
    pub fn invalidate(&self, key: &K) {
        self.entries.write().unwrap().remove(key);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Number of entries, including any not yet evicted by a read.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
