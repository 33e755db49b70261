//! In-memory cache tier
//!
//! Bounded LRU map with per-entry TTL. Expired entries are purged lazily on
//! read and eagerly by [`MemoryCache::cleanup_expired`].

use crate::scan_cache::CacheKey;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

struct Inner<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters of a tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TierCounters {
    pub hits: u64,
    pub misses: u64,
}

impl TierCounters {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memory tier statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
    pub max_entries: usize,
    pub ttl: Duration,
}

/// Thread-safe LRU tier with TTL expiry
pub struct MemoryCache<V> {
    inner: Mutex<Inner<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> MemoryCache<V> {
    /// Create a tier holding at most `max_entries` (minimum one)
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            ttl,
            max_entries: capacity.get(),
        }
    }

    /// Look up a live entry and mark it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                let value = entry.value.clone();
                inner.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            trace!("Memory entry {} expired", key);
            inner.entries.pop(key);
        }
        inner.misses += 1;
        None
    }

    /// Insert at the most recently used position, evicting the LRU entry if full
    pub fn set(&self, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = self.inner.lock().entries.push(key.clone(), entry) {
            if evicted != key {
                trace!("Evicted memory entry {}", evicted);
            }
        }
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.pop(key).is_some()
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Remove all entries older than the TTL, returning how many went
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.ttl))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.pop(key);
        }
        expired.len()
    }

    /// Check for a key without touching recency or counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn counters(&self) -> TierCounters {
        let inner = self.inner.lock();
        TierCounters {
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    pub fn stats(&self) -> MemoryStats {
        let inner = self.inner.lock();
        let counters = TierCounters {
            hits: inner.hits,
            misses: inner.misses,
        };
        MemoryStats {
            hits: counters.hits,
            misses: counters.misses,
            hit_rate: counters.hit_rate(),
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_raw(s)
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::new(10, Duration::from_secs(60));
        cache.set(key("a"), vec!["/x".to_string()]);
        assert_eq!(cache.get(&key("a")), Some(vec!["/x".to_string()]));
        assert_eq!(cache.get(&key("b")), None);
        assert_eq!(cache.counters(), TierCounters { hits: 1, misses: 1 });
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let cache = MemoryCache::new(10, Duration::from_millis(30));
        cache.set(key("a"), 1);
        thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.get(&key("a")), None);
        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.counters(), TierCounters { hits: 0, misses: 1 });
    }

    #[test]
    fn test_lru_eviction_removes_least_recently_accessed() {
        let cache = MemoryCache::new(3, Duration::from_secs(60));
        cache.set(key("a"), 1);
        cache.set(key("b"), 2);
        cache.set(key("c"), 3);

        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get(&key("a")), Some(1));
        cache.set(key("d"), 4);

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&key("b")));
        assert_eq!(cache.get(&key("a")), Some(1));
        assert_eq!(cache.get(&key("c")), Some(3));
        assert_eq!(cache.get(&key("d")), Some(4));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = MemoryCache::new(2, Duration::from_secs(60));
        cache.set(key("a"), 1);
        cache.set(key("b"), 2);
        cache.set(key("a"), 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("a")), Some(10));
        assert_eq!(cache.get(&key("b")), Some(2));
    }

    #[test]
    fn test_cleanup_expired_sweeps_without_reads() {
        let cache = MemoryCache::new(10, Duration::from_millis(30));
        cache.set(key("old1"), 1);
        cache.set(key("old2"), 2);
        thread::sleep(Duration::from_millis(60));
        cache.set(key("fresh"), 3);

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.counters(), TierCounters::default());
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = MemoryCache::new(10, Duration::from_secs(60));
        cache.set(key("a"), 1);
        cache.set(key("b"), 2);
        assert!(cache.delete(&key("a")));
        assert!(!cache.delete(&key("a")));
        cache.get(&key("b"));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.counters(), TierCounters::default());
    }

    #[test]
    fn test_stats_report_hit_rate() {
        let cache = MemoryCache::new(5, Duration::from_secs(60));
        cache.set(key("a"), 1);
        cache.get(&key("a"));
        cache.get(&key("a"));
        cache.get(&key("a"));
        cache.get(&key("z"));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.max_entries, 5);
        assert_eq!(stats.hit_rate, 0.75);
    }
}
