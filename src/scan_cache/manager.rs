//! Cache manager
//!
//! One [`CacheManager`] is built at startup and shared (usually behind an
//! `Arc`) with everything that reads or writes scan results. It derives
//! cache keys, routes file lists through the two-tier cache and exposes the
//! directory-state cache.
//!
//! [`CacheManager::clear_all`] empties the memory and persistent tiers only.
//! Directory-state files stay on disk until
//! [`CacheManager::clear_directory_states`] is called.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::filters::FilterSet;
use crate::scan_cache::database::{EntryMetadata, PersistentCache};
use crate::scan_cache::dir_state::{DirStateCache, DirectoryState};
use crate::scan_cache::hierarchical::{HierarchicalCache, HierarchicalStats};
use crate::scan_cache::key::normalize_path;
use crate::scan_cache::memory::MemoryCache;
use crate::scan_cache::CacheKey;
use crate::walker::WalkOptions;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Subdirectory holding directory-state files
const DIR_STATE_SUBDIR: &str = "fscache";

/// Entries removed by [`CacheManager::cleanup`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub memory: usize,
    pub persistent: usize,
    pub directory_state: usize,
    pub total: usize,
}

/// Snapshot returned by [`CacheManager::stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub cache_dir: PathBuf,
    pub hierarchical: HierarchicalStats,
    pub dir_state_dir: PathBuf,
    pub dir_state_files: usize,
}

pub struct CacheManager {
    files: HierarchicalCache<Vec<PathBuf>>,
    dir_states: DirStateCache,
    cache_dir: PathBuf,
    dir_state_max_age: Duration,
    enabled: AtomicBool,
}

impl CacheManager {
    /// Open every tier under the configured cache directory
    pub fn open(config: &CacheConfig) -> CacheResult<Self> {
        let cache_dir = config.resolve_dir().ok_or(CacheError::NoCacheDir)?;
        fs::create_dir_all(&cache_dir)?;

        let memory = MemoryCache::new(config.memory_max_entries, config.memory_ttl());
        let persistent = PersistentCache::open(&cache_dir, config.persistent_ttl())?;
        let dir_states = DirStateCache::open(cache_dir.join(DIR_STATE_SUBDIR))?;

        debug!("Cache opened at {}", cache_dir.display());
        Ok(Self {
            files: HierarchicalCache::new(memory, persistent),
            dir_states,
            cache_dir,
            dir_state_max_age: config.dir_state_max_age(),
            enabled: AtomicBool::new(config.enabled),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cached file list for `path` queried with `filters`
    pub fn get_file_list(&self, path: &Path, filters: &FilterSet) -> Option<Vec<PathBuf>> {
        self.lookup(&CacheKey::derive(path, filters))
    }

    /// Cached file list for a walk run with `options`
    ///
    /// Entries stored under a different depth ceiling or symlink policy are
    /// not visible here.
    pub fn get_file_list_for(
        &self,
        path: &Path,
        filters: &FilterSet,
        options: &WalkOptions,
    ) -> Option<Vec<PathBuf>> {
        self.lookup(&CacheKey::derive_with(path, filters, options.key_fields()))
    }

    /// Store a scan result
    ///
    /// Without `metadata` the total size is computed by statting every path.
    /// A failed persistent write is logged; the list still lands in memory.
    pub fn set_file_list(
        &self,
        path: &Path,
        filters: &FilterSet,
        files: &[PathBuf],
        metadata: Option<EntryMetadata>,
    ) {
        self.store(CacheKey::derive(path, filters), path, files, metadata);
    }

    /// Store the result of a walk run with `options`
    pub fn set_file_list_for(
        &self,
        path: &Path,
        filters: &FilterSet,
        options: &WalkOptions,
        files: &[PathBuf],
        metadata: Option<EntryMetadata>,
    ) {
        let key = CacheKey::derive_with(path, filters, options.key_fields());
        self.store(key, path, files, metadata);
    }

    pub fn get_directory_state(&self, path: &Path) -> Option<DirectoryState> {
        if !self.is_enabled() {
            return None;
        }
        self.dir_states.get(path)
    }

    pub fn set_directory_state(&self, path: &Path, payload: serde_json::Value) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.dir_states.set(path, payload) {
            warn!("Failed to write directory state for {}: {}", path.display(), e);
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        info!("Cache enabled");
    }

    /// Bypass every tier; stored entries are kept
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        info!("Cache disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Sweep expired entries from every tier
    pub fn cleanup(&self) -> CleanupReport {
        let tiers = self.files.cleanup();
        let directory_state = self
            .dir_states
            .cleanup_old(self.dir_state_max_age)
            .unwrap_or_else(|e| {
                warn!("Directory state cleanup failed: {}", e);
                0
            });

        let report = CleanupReport {
            memory: tiers.memory_cleaned,
            persistent: tiers.persistent_cleaned,
            directory_state,
            total: tiers.total() + directory_state,
        };
        info!(
            "Cache cleanup removed {} entries ({} memory, {} persistent, {} directory states)",
            report.total, report.memory, report.persistent, report.directory_state
        );
        report
    }

    /// Empty the memory and persistent tiers
    ///
    /// Directory-state files are left in place; see
    /// [`CacheManager::clear_directory_states`].
    pub fn clear_all(&self) -> CacheResult<()> {
        self.files.clear()?;
        info!("Cleared memory and persistent caches");
        Ok(())
    }

    /// Delete every directory-state file, returning how many went
    pub fn clear_directory_states(&self) -> CacheResult<usize> {
        let removed = self.dir_states.clear()?;
        info!("Removed {} directory state files", removed);
        Ok(removed)
    }

    fn lookup(&self, key: &CacheKey) -> Option<Vec<PathBuf>> {
        if !self.is_enabled() {
            return None;
        }
        self.files.get(key)
    }

    fn store(
        &self,
        key: CacheKey,
        path: &Path,
        files: &[PathBuf],
        metadata: Option<EntryMetadata>,
    ) {
        if !self.is_enabled() {
            return;
        }

        let metadata = metadata.unwrap_or_else(|| EntryMetadata {
            origin_path: normalize_path(path).to_string_lossy().into_owned(),
            file_count: files.len() as u64,
            total_size: total_size(files),
        });

        if let Err(e) = self.files.set(&key, files.to_vec(), &metadata) {
            warn!("Failed to persist file list for {}: {}", path.display(), e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            cache_dir: self.cache_dir.clone(),
            hierarchical: self.files.stats(),
            dir_state_dir: self.dir_states.dir().to_path_buf(),
            dir_state_files: self.dir_states.count(),
        }
    }
}

/// Sum of the sizes of `files` that can still be statted
fn total_size(files: &[PathBuf]) -> u64 {
    files
        .iter()
        .filter_map(|file| fs::metadata(file).ok())
        .map(|m| m.len())
        .sum()
}
