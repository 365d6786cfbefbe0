//! Bounded TTL cache for resolved redirects
//!
//! Players often fire several range requests for the same file within a few
//! seconds. Each resolved target is kept for a short TTL so those requests
//! share one signed URL. Time comes from an injected [`Clock`], which lets
//! tests expire entries without sleeping.

use bridge_traits::time::Clock;
use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct Entry<V> {
    value: V,
    expires_at_ms: i64,
}

/// LRU cache whose entries also expire after a fixed TTL
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// A zero `capacity` is treated as 1
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`; an expired entry is dropped and reported as absent
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.unix_timestamp_millis();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(entry) if entry.expires_at_ms > now => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: K, value: V) {
        let expires_at_ms = self.clock.unix_timestamp_millis() + self.ttl.as_millis() as i64;
        self.entries.lock().await.put(
            key,
            Entry {
                value,
                expires_at_ms,
            },
        );
    }

    /// Entries currently held, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
