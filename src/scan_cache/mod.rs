//! Multi-tier scan result cache
//!
//! File lists are keyed by a fingerprint of the query and served from a
//! bounded in-memory LRU tier in front of a SQLite store. A separate
//! directory-state cache tracks per-directory mtimes for cheap staleness
//! checks. [`CacheManager`] ties the pieces together.

pub mod database;
pub mod dir_state;
pub mod hierarchical;
pub mod key;
pub mod manager;
pub mod memory;

pub use database::{EntryMetadata, PersistentCache, PersistentStats};
pub use dir_state::{DirStateCache, DirectoryState};
pub use hierarchical::{HierarchicalCache, HierarchicalStats, TierCleanup};
pub use key::{CacheKey, CACHE_SCHEMA_VERSION};
pub use manager::{CacheManager, CacheStats, CleanupReport};
pub use memory::{MemoryCache, MemoryStats, TierCounters};
