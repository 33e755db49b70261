//! Cached directory scanning
//!
//! [`Scanner`] is the entry point the CLI and library callers use. It looks
//! a query up in the [`CacheManager`] first and only walks the tree on a
//! miss, writing the fresh result back through every tier.

use crate::config::{CacheConfig, Config};
use crate::error::{CacheResult, ScanError};
use crate::filters::FilterSet;
use crate::scan_cache::{CacheManager, CacheStats, CleanupReport, EntryMetadata};
use crate::walker::{self, ScanResult, ScanStats, WalkOptions, Walker};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of [`Scanner::scan_directory`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    /// Canonical root that was scanned
    pub root: PathBuf,
    pub paths: Vec<PathBuf>,
    /// Walk statistics; `None` when served from cache
    pub stats: Option<ScanStats>,
    pub from_cache: bool,
}

pub struct Scanner {
    walker: Walker,
    cache: Option<Arc<CacheManager>>,
}

impl Scanner {
    /// Uncached scanner around `walker`
    pub fn new(walker: Walker) -> Self {
        Self {
            walker,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build a walker and open the cache from `config`
    ///
    /// A cache that cannot be opened is logged and the scanner runs
    /// uncached.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Walker::new(WalkOptions::from(&config.scan))).with_cache_from(&config.cache)
    }

    /// Attach a cache opened from `config`, or log and stay uncached
    pub fn with_cache_from(self, config: &CacheConfig) -> Self {
        match CacheManager::open(config) {
            Ok(cache) => self.with_cache(Arc::new(cache)),
            Err(e) => {
                warn!("Cache unavailable, scanning without it: {}", e);
                self
            }
        }
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.cache.as_ref()
    }

    /// Files under `root` matching `filters`
    ///
    /// The root must exist and be a directory even when the answer comes
    /// from cache. With `use_cache` false the cache is neither read nor
    /// written.
    pub fn scan_directory(
        &self,
        root: &Path,
        filters: &FilterSet,
        use_cache: bool,
    ) -> Result<ScanOutcome, ScanError> {
        let root = walker::resolve_root(root)?;
        let cache = self.cache.as_deref().filter(|_| use_cache);
        let options = self.walker.options();

        if let Some(paths) = cache.and_then(|c| c.get_file_list_for(&root, filters, options)) {
            debug!("Serving {} paths for {} from cache", paths.len(), root.display());
            return Ok(ScanOutcome {
                root,
                paths,
                stats: None,
                from_cache: true,
            });
        }

        let (paths, stats) = self.walker.scan(&root, filters)?.finish();

        if let Some(cache) = cache {
            let metadata = EntryMetadata {
                origin_path: root.to_string_lossy().into_owned(),
                file_count: paths.len() as u64,
                total_size: stats.total_bytes,
            };
            cache.set_file_list_for(&root, filters, options, &paths, Some(metadata));
        }

        Ok(ScanOutcome {
            root,
            paths,
            stats: Some(stats),
            from_cache: false,
        })
    }

    /// Lazy uncached walk, for callers that want paths as they are found
    pub fn stream(&self, root: &Path, filters: &FilterSet) -> Result<ScanResult, ScanError> {
        self.walker.scan(root, filters)
    }

    /// Cached list for `path` under this scanner's walker options
    pub fn get_cached_file_list(&self, path: &Path, filters: &FilterSet) -> Option<Vec<PathBuf>> {
        self.cache.as_ref()?.get_file_list_for(path, filters, self.walker.options())
    }

    pub fn set_cached_file_list(
        &self,
        path: &Path,
        filters: &FilterSet,
        files: &[PathBuf],
        metadata: Option<EntryMetadata>,
    ) {
        if let Some(cache) = &self.cache {
            cache.set_file_list_for(path, filters, self.walker.options(), files, metadata);
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn cleanup(&self) -> Option<CleanupReport> {
        self.cache.as_ref().map(|c| c.cleanup())
    }

    /// Empty the memory and persistent tiers; directory states are kept
    pub fn clear_all(&self) -> CacheResult<()> {
        match &self.cache {
            Some(cache) => cache.clear_all(),
            None => Ok(()),
        }
    }

    pub fn enable_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.enable();
        }
    }

    pub fn disable_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.disable();
        }
    }
}
