//! Two-tier cache facade: memory in front of the persistent store

use crate::error::CacheResult;
use crate::scan_cache::database::{EntryMetadata, PersistentCache, PersistentStats};
use crate::scan_cache::memory::{MemoryCache, MemoryStats};
use crate::scan_cache::CacheKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Combined statistics of both tiers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchicalStats {
    pub memory: MemoryStats,
    /// `None` if the store could not be queried
    pub persistent: Option<PersistentStats>,
    pub combined_hit_rate: f64,
}

/// Entries removed by an expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCleanup {
    pub memory_cleaned: usize,
    pub persistent_cleaned: usize,
}

impl TierCleanup {
    pub fn total(&self) -> usize {
        self.memory_cleaned + self.persistent_cleaned
    }
}

/// Read-through, write-through composition of the two tiers
pub struct HierarchicalCache<V> {
    memory: MemoryCache<V>,
    persistent: PersistentCache,
}

impl<V> HierarchicalCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn new(memory: MemoryCache<V>, persistent: PersistentCache) -> Self {
        Self { memory, persistent }
    }

    /// Memory first; a persistent hit is promoted into memory
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            debug!("Memory hit for {}", key);
            return Some(value);
        }

        let value: V = self.persistent.get(key)?;
        debug!("Persistent hit for {}, promoting to memory", key);
        self.memory.set(key.clone(), value.clone());
        Some(value)
    }

    /// Write to both tiers
    ///
    /// The memory write always happens. A persistent write failure is
    /// returned so the caller can log it; the value stays usable from memory.
    pub fn set(&self, key: &CacheKey, value: V, metadata: &EntryMetadata) -> CacheResult<()> {
        let result = self.persistent.set(key, &value, metadata);
        self.memory.set(key.clone(), value);
        result
    }

    pub fn delete(&self, key: &CacheKey) {
        self.memory.delete(key);
        if let Err(e) = self.persistent.delete(key) {
            warn!("Failed to delete persistent entry {}: {}", key, e);
        }
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.memory.clear();
        self.persistent.clear()?;
        Ok(())
    }

    /// Sweep expired entries from both tiers
    pub fn cleanup(&self) -> TierCleanup {
        let memory_cleaned = self.memory.cleanup_expired();
        let persistent_cleaned = self.persistent.cleanup_expired().unwrap_or_else(|e| {
            warn!("Persistent cache cleanup failed: {}", e);
            0
        });
        TierCleanup {
            memory_cleaned,
            persistent_cleaned,
        }
    }

    pub fn stats(&self) -> HierarchicalStats {
        let memory = self.memory.stats();
        let persistent = match self.persistent.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Failed to read persistent cache stats: {}", e);
                None
            }
        };

        let memory_counters = self.memory.counters();
        let persistent_counters = self.persistent.counters();
        let hits = memory_counters.hits + persistent_counters.hits;
        let lookups = hits + memory_counters.misses + persistent_counters.misses;
        let combined_hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };

        HierarchicalStats {
            memory,
            persistent,
            combined_hit_rate,
        }
    }

    pub fn memory(&self) -> &MemoryCache<V> {
        &self.memory
    }

    pub fn persistent(&self) -> &PersistentCache {
        &self.persistent
    }
}
