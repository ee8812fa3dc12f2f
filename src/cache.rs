//! Simple in-memory cache (§1, peripheral): a generic TTL-keyed cache used
//! by discovery to avoid re-fetching the same `robots.txt`/sitemap body
//! twice in quick succession. Each key gets its own freshness check rather
//! than a single global snapshot, since entries are independent per URL.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: Arc<V>,
    inserted_at: Instant,
}

/// A bounded-freshness cache: entries older than `ttl` are treated as
/// absent by `get`, but are not proactively evicted (cheap to keep around,
/// and a later `insert` for the same key simply replaces them).
#[derive(Clone)]
pub struct TtlCache<K, V> {
    inner: Arc<DashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Return the cached value for `key` if present and not yet stale.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let entry = self.inner.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.insert(
            key,
            Entry {
                value: Arc::new(value),
                inserted_at: Instant::now(),
            },
        );
    }
}
