//! Concurrent directory walker
//!
//! A fixed pool of worker threads pulls directories from a shared LIFO
//! frontier. Listing a directory requires a permit from a counting
//! [`PermitPool`], so the number of listings in flight never exceeds the
//! pool capacity no matter how many directories are queued. Accepted paths
//! stream back through a bounded channel and are consumed lazily through
//! [`ScanResult`].

pub mod frontier;
pub mod permits;
pub mod stats;
pub mod worker;

pub use frontier::{DirTask, Frontier};
pub use permits::{Permit, PermitPool};
pub use stats::ScanStats;
pub use worker::{EntryOutcome, PathCallback};

use crate::config::{ScanConfig, DEFAULT_MAX_DEPTH};
use crate::error::ScanError;
use crate::filters::FilterSet;
use crossbeam_channel::{bounded, Receiver};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;
use worker::WalkShared;

/// Ignore set installed when the caller registers none
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "**/.git",
    "**/.git/**",
    "**/.svn",
    "**/.svn/**",
    "**/.hg",
    "**/.hg/**",
    "**/__pycache__",
    "**/__pycache__/**",
    "**/*.pyc",
    "**/*.pyo",
    "**/*.pyd",
    "**/.DS_Store",
];

/// Capacity of the channel between workers and the consumer
const RESULT_CHANNEL_CAPACITY: usize = 1024;

/// Walker tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub max_depth: usize,
    pub max_concurrent: usize,
    pub workers: usize,
    pub follow_symlinks: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for WalkOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_concurrent: config.max_concurrent,
            workers: config.workers,
            follow_symlinks: config.follow_symlinks,
        }
    }
}

impl WalkOptions {
    /// Options that change which paths a walk yields, for cache keys
    ///
    /// Settings at their defaults are left out. Concurrency knobs never
    /// change the result set and are not included.
    pub fn key_fields(&self) -> BTreeMap<&'static str, serde_json::Value> {
        let mut fields = BTreeMap::new();
        if self.max_depth != DEFAULT_MAX_DEPTH {
            fields.insert("max_depth", serde_json::Value::from(self.max_depth));
        }
        if self.follow_symlinks {
            fields.insert("follow_symlinks", serde_json::Value::Bool(true));
        }
        fields
    }
}

/// Concurrency-bounded recursive file finder
pub struct Walker {
    options: WalkOptions,
    permits: Arc<PermitPool>,
    callback: Option<PathCallback>,
}

impl Walker {
    pub fn new(options: WalkOptions) -> Self {
        let permits = Arc::new(PermitPool::new(options.max_concurrent));
        Self {
            options,
            permits,
            callback: None,
        }
    }

    /// Share an existing permit pool, e.g. across walkers or for inspection
    pub fn with_permit_pool(mut self, permits: Arc<PermitPool>) -> Self {
        self.options.max_concurrent = permits.capacity();
        self.permits = permits;
        self
    }

    /// Invoke `callback` for every accepted path
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    pub fn permits(&self) -> &Arc<PermitPool> {
        &self.permits
    }

    /// Start a scan of `root`
    ///
    /// Fails only if the root is missing, is not a directory, or an ignore
    /// pattern does not compile. Every other failure is counted in the
    /// statistics of the returned [`ScanResult`].
    pub fn scan(&self, root: &Path, filters: &FilterSet) -> Result<ScanResult, ScanError> {
        let root = resolve_root(root)?;
        let ignore = build_ignore_set(filters.ignore.as_deref())?;

        let shared = Arc::new(WalkShared::new(
            Arc::clone(&self.permits),
            ignore,
            filters.pipeline(),
            self.options.max_depth,
            self.options.follow_symlinks,
            self.callback.clone(),
        ));
        if self.options.follow_symlinks {
            shared.mark_visited(root.clone());
        }
        shared.frontier.push(DirTask::root(root.clone()));

        debug!(
            "Scanning {} with {} workers, {} listing permits",
            root.display(),
            self.options.workers.max(1),
            self.permits.capacity()
        );

        let started = Instant::now();
        let (sender, receiver) = bounded(RESULT_CHANNEL_CAPACITY);
        let mut handles = Vec::with_capacity(self.options.workers.max(1));
        for id in 0..self.options.workers.max(1) {
            let shared_clone = Arc::clone(&shared);
            let sender = sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("fastfind-walker-{}", id))
                .spawn(move || worker::worker_loop(id, shared_clone, sender));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.cancel();
                    return Err(ScanError::Spawn(e));
                }
            }
        }

        Ok(ScanResult {
            root,
            receiver: Some(receiver),
            handles,
            shared,
            seen: HashSet::new(),
            started,
            stats: None,
        })
    }
}

/// Canonicalize the root and check it is a directory
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let resolved =
        fs::canonicalize(root).map_err(|e| ScanError::invalid_root(root, e.to_string()))?;
    if !resolved.is_dir() {
        return Err(ScanError::invalid_root(root, "not a directory"));
    }
    Ok(resolved)
}

/// Compile ignore globs, installing the defaults when none were registered
pub fn build_ignore_set(patterns: Option<&[String]>) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    let mut add = |pattern: &str| -> Result<(), ScanError> {
        let glob = Glob::new(pattern).map_err(|source| ScanError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        builder.add(glob);
        Ok(())
    };

    match patterns {
        Some(patterns) if !patterns.is_empty() => {
            for pattern in patterns {
                add(pattern)?;
            }
        }
        _ => {
            for pattern in DEFAULT_IGNORE_PATTERNS {
                add(pattern)?;
            }
        }
    }

    builder.build().map_err(|source| ScanError::InvalidPattern {
        pattern: "<set>".to_string(),
        source,
    })
}

/// Lazy, finite, deduplicated stream of absolute file paths
///
/// Not restartable. Dropping it before exhaustion stops the walk: no new
/// permits are taken and listings already running are discarded.
pub struct ScanResult {
    root: PathBuf,
    receiver: Option<Receiver<PathBuf>>,
    handles: Vec<JoinHandle<()>>,
    shared: Arc<WalkShared>,
    seen: HashSet<PathBuf>,
    started: Instant,
    stats: Option<ScanStats>,
}

impl ScanResult {
    /// Canonical root being scanned
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Statistics, available once the sequence is exhausted
    pub fn stats(&self) -> Option<&ScanStats> {
        self.stats.as_ref()
    }

    /// Drain the remaining paths and return them with the final statistics
    pub fn finish(mut self) -> (Vec<PathBuf>, ScanStats) {
        let paths: Vec<PathBuf> = self.by_ref().collect();
        let stats = self.stats.take().unwrap_or_default();
        (paths, stats)
    }

    fn complete(&mut self) {
        self.receiver = None;
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        let stats = self
            .shared
            .counters
            .snapshot(self.seen.len() as u64, self.started.elapsed());
        debug!(
            "Scan of {} finished: {} files, {} dirs, {} errors in {:?}",
            self.root.display(),
            stats.files_found,
            stats.dirs_scanned,
            stats.permission_errors,
            stats.elapsed
        );
        self.stats = Some(stats);
    }
}

impl Iterator for ScanResult {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let received = self.receiver.as_ref()?.recv();
            match received {
                Ok(path) => {
                    if self.seen.insert(path.clone()) {
                        return Some(path);
                    }
                }
                Err(_) => {
                    // Every worker has exited
                    self.complete();
                    return None;
                }
            }
        }
    }
}

impl Drop for ScanResult {
    fn drop(&mut self) {
        if self.receiver.is_some() {
            self.shared.cancel();
            self.receiver = None;
            for handle in self.handles.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
