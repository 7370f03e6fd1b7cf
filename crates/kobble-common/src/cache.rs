//! Generic key/value cache with lazy TTL expiry.
//!
//! Every resolver in the SDK (JWKS sets, the gateway public key, the project
//! identity) owns its own `TtlCache` instance, parametrized over its value
//! type, instead of sharing one polymorphic store.
//!
//! # Concurrency
//!
//! - A single `std::sync::Mutex` guards the map
//! - The lock is held only for the duration of one map operation and never
//!   across an `.await` or a network call
//! - Concurrent misses on the same key may both fetch upstream; the last
//!   `set` wins
//!
//! # Expiry
//!
//! Entries are evicted lazily: an expired entry is removed by the `get` that
//! observes it. There is no background sweeper, so expired entries that are
//! never read again stay in memory until the cache is dropped or cleared.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A cached value together with its bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,

    /// When the value was stored.
    pub created_at: Instant,

    /// When the value stops being served. `None` means it never expires.
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Returns `true` if the entry is still valid at `now`.
    ///
    /// An entry is valid up to and including its `expires_at` instant.
    #[must_use]
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now <= expires_at)
    }
}

/// Thread-safe TTL cache with lazy eviction.
///
/// Values are cloned out on `get`; store `Arc<T>` for values that are
/// expensive to clone.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    default_ttl: Option<Duration>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache whose entries never expire unless `set` is given a TTL.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: None,
        }
    }

    /// Create a cache applying `default_ttl` to entries stored without an
    /// explicit TTL.
    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: Some(default_ttl),
        }
    }

    /// The TTL applied when `set` is called without one.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Get a fresh value, evicting it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.lock();

        let fresh = entries.get(key).map(|entry| entry.is_fresh_at(now))?;
        if fresh {
            tracing::debug!(target: "kobble.cache", "Cache hit");
            return entries.get(key).map(|entry| entry.value.clone());
        }

        entries.remove(key);
        tracing::debug!(target: "kobble.cache", "Cache entry expired, evicted");
        None
    }

    /// Store a value.
    ///
    /// The entry expires after `ttl` if given, otherwise after the cache's
    /// default TTL, otherwise never.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    fn set_at(&self, key: K, value: V, ttl: Option<Duration>, now: Instant) {
        let expires_at = ttl
            .or(self.default_ttl)
            .and_then(|ttl| now.checked_add(ttl));

        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at,
        };

        self.lock().insert(key, entry);
    }

    /// Remove a value regardless of its expiry.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A poisoned lock only means another thread panicked mid-operation; the
    /// map itself is always left in a consistent state, so keep using it.
    fn lock(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
