//! Per-directory staleness cache
//!
//! Stores a small JSON file per directory, named by the blake3 hash of the
//! canonical path and tagged with the directory's mtime at caching time. A
//! state is valid only while that mtime has not advanced. The check is a
//! single level deep: changes inside subdirectories go unnoticed, so this
//! never stands in for a full recursive scan result.

use crate::error::CacheResult;
use crate::scan_cache::key::normalize_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Cached descriptor of one directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryState {
    pub path: PathBuf,
    /// Directory mtime in nanoseconds since the epoch
    pub mtime_nanos: u64,
    pub cached_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Directory of state files
pub struct DirStateCache {
    dir: PathBuf,
}

impl DirStateCache {
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached state for `path`, if the directory has not changed since
    pub fn get(&self, path: &Path) -> Option<DirectoryState> {
        let current = dir_mtime(path)?;
        let content = fs::read_to_string(self.state_file(path)).ok()?;

        let state: DirectoryState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                debug!("Ignoring unreadable directory state for {}: {}", path.display(), e);
                return None;
            }
        };

        if current > state.mtime_nanos {
            trace!("Directory state for {} is stale", path.display());
            return None;
        }
        Some(state)
    }

    /// Record `payload` against the directory's current mtime
    ///
    /// Paths that are not existing directories are ignored.
    pub fn set(&self, path: &Path, payload: serde_json::Value) -> CacheResult<()> {
        let Some(mtime_nanos) = dir_mtime(path) else {
            return Ok(());
        };

        let state = DirectoryState {
            path: normalize_path(path),
            mtime_nanos,
            cached_at: Utc::now(),
            payload,
        };
        fs::write(self.state_file(path), serde_json::to_vec_pretty(&state)?)?;
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> CacheResult<bool> {
        match fs::remove_file(self.state_file(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every state file
    pub fn clear(&self) -> CacheResult<usize> {
        self.remove_where(|_| true)
    }

    /// Delete state files last written more than `max_age` ago
    pub fn cleanup_old(&self, max_age: Duration) -> CacheResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(UNIX_EPOCH);
        self.remove_where(|file| {
            fs::metadata(file)
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false)
        })
    }

    /// Number of state files on disk
    pub fn count(&self) -> usize {
        self.state_files().map(|files| files.len()).unwrap_or(0)
    }

    fn remove_where(&self, predicate: impl Fn(&Path) -> bool) -> CacheResult<usize> {
        let mut deleted = 0;
        for file in self.state_files()? {
            if predicate(&file) && fs::remove_file(&file).is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn state_files(&self) -> CacheResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn state_file(&self, path: &Path) -> PathBuf {
        let normalized = normalize_path(path);
        let hash = blake3::hash(normalized.to_string_lossy().as_bytes());
        self.dir.join(format!("{}.json", hash.to_hex()))
    }
}

/// Mtime of an existing directory in nanoseconds since the epoch
fn dir_mtime(path: &Path) -> Option<u64> {
    let metadata = fs::metadata(path).ok()?;
    if !metadata.is_dir() {
        return None;
    }
    let modified = metadata.modified().ok()?;
    Some(
        modified
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0),
    )
}
