//! Fixed-capacity key/value store with least-recently-used eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::CacheStats;

/// Bounded LRU cache.
///
/// Every `get` hit and every `put` counts as an access. Inserting a new key
/// into a full cache first evicts the entry accessed longest ago. All state
/// sits behind one mutex; no operation suspends.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_size: usize,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, (V, u64)>,
    /// Access tick -> key, oldest first.
    order: BTreeMap<u64, K>,
    tick: u64,
    stats: CacheStats,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    /// Creates a cache holding at most `max_size` entries (minimum 1).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            max_size: max_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let tick = inner.next_tick();

        let Some((value, old_tick)) = inner.entries.get_mut(key).map(|(v, t)| {
            let old = *t;
            *t = tick;
            (v.clone(), old)
        }) else {
            inner.stats.misses += 1;
            return None;
        };

        inner.order.remove(&old_tick);
        inner.order.insert(tick, key.clone());
        inner.stats.hits += 1;
        Some(value)
    }

    /// Inserts or replaces `key`, evicting the least recently used entry if
    /// the cache would otherwise exceed its capacity.
    pub fn put(&self, key: K, value: V) {
        let mut inner = self.lock();
        let tick = inner.next_tick();

        if let Some((_, old_tick)) = inner.entries.remove(&key) {
            inner.order.remove(&old_tick);
        } else if inner.entries.len() >= self.max_size {
            if let Some((_, lru_key)) = inner.order.pop_first() {
                inner.entries.remove(&lru_key);
                inner.stats.evictions += 1;
                debug!(key = ?lru_key, "Evicted least recently used cache entry");
            }
        }

        inner.order.insert(tick, key.clone());
        inner.entries.insert(key, (value, tick));
        inner.stats.size = inner.entries.len();
    }

    /// Whether `key` is present. Does not count as an access.
    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Removes every entry. Statistics other than `size` are kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.stats.size = 0;
    }

    /// Snapshot of hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats { size: inner.entries.len(), ..inner.stats.clone() }
    }
}
