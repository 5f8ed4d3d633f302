//! # editsync cache
//!
//! A small thread-safe cache with per-entry expiry.
//!
//! Editor resources such as parsed definitions or decoded blobs are expensive
//! to rebuild. A [`TtlCache`] keeps them around for a fixed time window so they
//! are rebuilt at most once per window.
//!
//! ## Ownership
//!
//! Values are stored behind an [`Arc`]. [`TtlCache::get`] hands out the live,
//! shared value; callers that intend to mutate must use
//! [`TtlCache::get_copy`], which returns a deep copy.
//!
//! When a value leaves the cache (replaced, expired, removed, cleared or
//! dropped with the cache) the optional release function passed to
//! [`TtlCache::with_release`] is called exactly once for it. The release
//! function always runs after the entry has been unlinked from the map, so
//! other threads can never observe an entry that is being released.
//!
//! ## Usage
//!
//! ```
//! use editsync_cache::TtlCache;
//! use std::time::Duration;
//!
//! let cache = TtlCache::new(Duration::from_secs(60));
//! cache.add("level-1", vec![1u8, 2, 3]);
//!
//! assert_eq!(cache.get(&"level-1").as_deref(), Some(&vec![1u8, 2, 3]));
//!
//! let mut copy = cache.get_copy(&"level-1").unwrap();
//! copy.push(4);
//! assert_eq!(cache.get(&"level-1").unwrap().len(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Function invoked with every value that leaves the cache.
pub type ReleaseFn<V> = Box<dyn Fn(&V) + Send + Sync>;

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// A key/value cache where every entry expires a fixed time after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
    release: Option<ReleaseFn<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
{
    /// Creates a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            release: None,
        }
    }

    /// Creates a cache that calls `release` for every value leaving it.
    pub fn with_release<F>(ttl: Duration, release: F) -> Self
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            release: Some(Box::new(release)),
        }
    }

    /// Returns the time-to-live applied to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts `value` under `key`, releasing any value previously stored there.
    pub fn add(&self, key: K, value: V) {
        let entry = Entry {
            value: Arc::new(value),
            expires_at: Instant::now() + self.ttl,
        };
        let previous = self.entries.lock().insert(key, entry);

        if let Some(previous) = previous {
            self.release_value(&previous.value);
        }
    }

    /// Returns the live value for `key`.
    ///
    /// Returns `None` when the key is absent or its entry has expired. Expired
    /// entries are evicted and released.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let now = Instant::now();
        let evicted = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(Arc::clone(&entry.value)),
                Some(_) => entries.remove(key),
            }
        };

        if let Some(evicted) = evicted {
            tracing::trace!("evicted expired cache entry");
            self.release_value(&evicted.value);
        }
        None
    }

    /// Removes the entry for `key`, releasing its value.
    ///
    /// Returns true if an entry was present (expired or not).
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.entries.lock().remove(key);
        match removed {
            Some(entry) => {
                self.release_value(&entry.value);
                true
            }
            None => false,
        }
    }

    /// Evicts every expired entry and returns how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut expired: Vec<Arc<V>> = Vec::new();
        self.entries.lock().retain(|_, entry| {
            if entry.is_expired(now) {
                expired.push(Arc::clone(&entry.value));
                false
            } else {
                true
            }
        });

        for value in &expired {
            self.release_value(value);
        }
        expired.len()
    }

    /// Removes and releases every entry.
    pub fn clear(&self) {
        let drained: Vec<Arc<V>> = self.entries.lock().drain().map(|(_, e)| e.value).collect();
        for value in &drained {
            self.release_value(value);
        }
    }

    /// Returns the number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn release_value(&self, value: &V) {
        if let Some(release) = &self.release {
            release(value);
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns a deep copy of the value for `key`.
    ///
    /// Use this instead of [`TtlCache::get`] whenever the caller intends to
    /// mutate the value.
    pub fn get_copy(&self, key: &K) -> Option<V> {
        self.get(key).map(|value| V::clone(&value))
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        if let Some(release) = &self.release {
            for (_, entry) in self.entries.get_mut().drain() {
                release(&entry.value);
            }
        }
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.lock().len())
            .field("has_release", &self.release.is_some())
            .finish()
    }
}
