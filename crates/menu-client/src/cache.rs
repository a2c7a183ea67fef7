use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe LRU cache whose entries also expire after `ttl`.
///
/// Capacity is a hard bound: inserting into a full cache evicts the least
/// recently used entry. Expired entries are dropped lazily on lookup.
pub struct BoundedCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone())
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
            debug!("Cache entry expired");
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
