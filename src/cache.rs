//! # Response Cache Module
//!
//! Bounded LRU cache of rendered responses, shared by every route that
//! resolves to the same instance and accessed concurrently by many
//! request-handling coroutines.
//!
//! ## Keys
//!
//! Entries are keyed by a fixed-length digest of the request identity
//! (`path`, plus `"?" + query` when a query string is present). Hashing the
//! identity bounds key length and keeps arbitrary user input out of the map;
//! the 128-bit digest makes collisions negligible in practice.
//!
//! ## Expiry
//!
//! The cache itself never expires anything. Staleness is enforced by the
//! caller at read time: compare [`CacheEntry::created_at`] against the
//! route's TTL and [`ResponseCache::erase`] entries that have aged out
//! (lazy expiry, no background sweep). Comparisons are one-second
//! granularity.
//!
//! ## Concurrency
//!
//! `LruCache::get` updates recency bookkeeping and therefore needs `&mut`,
//! so every operation goes through a `Mutex`; `get`/`put` are atomic with
//! respect to the LRU order.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Hex length of a cache key: 128 bits of the identity digest.
const KEY_HEX_LEN: usize = 32;

/// Current time in unix seconds. TTL math throughout the crate is done at
/// one-second granularity on this clock.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Compute the cache key for a request identity.
///
/// Identical `path`/`query` pairs always produce the identical key; any
/// change to either changes the key.
#[must_use]
pub fn digest_key(path: &str, query: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    if let Some(q) = query {
        hasher.update(b"?");
        hasher.update(q.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest.chars().take(KEY_HEX_LEN).collect()
}

/// One cached response. Overwritten wholesale on update, never partially
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// HTTP status of the cached response.
    pub status: u16,
    /// `Content-Type` the response was generated with.
    pub content_type: String,
    /// Response body bytes.
    pub body: Vec<u8>,
    /// Creation time in unix seconds; staleness decisions are the caller's.
    pub created_at: u64,
}

impl CacheEntry {
    /// Build an entry stamped with the current time.
    #[must_use]
    pub fn new(status: u16, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body,
            created_at: unix_now(),
        }
    }

    /// Seconds elapsed since the entry was created, as seen from `now`.
    #[must_use]
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Bounded LRU response cache.
///
/// Eviction is strict least-recently-used; both [`get`](Self::get) and
/// [`put`](Self::put) count as a use, [`exists`](Self::exists) does not.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
}

impl ResponseCache {
    /// Create a cache bounded to `capacity` entries. A zero capacity is
    /// clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let bound = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        debug!(capacity, "response cache created");
        Self {
            entries: Mutex::new(LruCache::new(bound)),
            capacity,
        }
    }

    /// Look up an entry, promoting it to most recently used.
    ///
    /// Staleness is ignored here; the caller decides whether the returned
    /// entry is still fresh.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .get(key)
            .cloned()
    }

    /// Whether an entry exists under `key`, without touching recency.
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .contains(key)
    }

    /// Insert or replace the entry under `key`, evicting the least recently
    /// used entry on overflow.
    pub fn put(&self, key: String, entry: CacheEntry) {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .put(key, entry);
    }

    /// Drop the entry under `key`, if any.
    pub fn erase(&self, key: &str) {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .pop(key);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured entry bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
