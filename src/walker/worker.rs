//! Worker thread logic for the concurrent walk
//!
//! Each worker:
//! - Pops a directory task from the shared frontier
//! - Holds a permit from the pool only while listing the directory
//! - Turns every entry into an [`EntryOutcome`] and folds it into the stats
//! - Pushes subdirectories back onto the frontier

use crate::error::EntryError;
use crate::filters::Filter;
use crate::walker::frontier::{DirTask, Frontier};
use crate::walker::permits::PermitPool;
use crate::walker::stats::StatsCounters;
use crossbeam_channel::Sender;
use globset::GlobSet;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, DirEntry, Metadata};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

/// Hook invoked for every accepted path; errors are swallowed
pub type PathCallback = Arc<dyn Fn(&Path) -> anyhow::Result<()> + Send + Sync>;

/// What happened to a single directory entry
#[derive(Debug)]
pub enum EntryOutcome {
    /// File passed every filter
    Accepted { path: PathBuf, size: u64 },
    /// Directory to list next
    Descend(DirTask),
    /// Matched an ignore pattern
    Ignored,
    /// Failed a filter, not followed, or already visited
    Rejected,
    /// Metadata could not be read
    Failed(EntryError),
}

/// State shared by every worker of one scan
pub(crate) struct WalkShared {
    pub frontier: Frontier,
    pub permits: Arc<PermitPool>,
    pub counters: StatsCounters,
    pub ignore: GlobSet,
    pub filter: Filter,
    pub max_depth: usize,
    pub follow_symlinks: bool,
    /// Canonical directories already queued, only tracked when following links
    pub visited: Mutex<HashSet<PathBuf>>,
    pub callback: Option<PathCallback>,
    cancelled: AtomicBool,
}

impl WalkShared {
    pub fn new(
        permits: Arc<PermitPool>,
        ignore: GlobSet,
        filter: Filter,
        max_depth: usize,
        follow_symlinks: bool,
        callback: Option<PathCallback>,
    ) -> Self {
        Self {
            frontier: Frontier::new(),
            permits,
            counters: StatsCounters::default(),
            ignore,
            filter,
            max_depth,
            follow_symlinks,
            visited: Mutex::new(HashSet::new()),
            callback,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.frontier.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Record a directory as visited; false if it was seen before
    pub fn mark_visited(&self, dir: PathBuf) -> bool {
        self.visited.lock().insert(dir)
    }
}

/// Marks the current task complete even if the worker unwinds
struct TaskGuard<'a> {
    shared: &'a WalkShared,
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.cancel();
        }
        self.shared.frontier.complete();
    }
}

/// Main loop of a walker thread
pub(crate) fn worker_loop(id: usize, shared: Arc<WalkShared>, results: Sender<PathBuf>) {
    trace!("walker-{} started", id);
    while let Some(task) = shared.frontier.pop() {
        let _guard = TaskGuard { shared: &shared };
        process_dir(&shared, &task, &results);
    }
    trace!("walker-{} finished", id);
}

fn process_dir(shared: &WalkShared, task: &DirTask, results: &Sender<PathBuf>) {
    if shared.is_cancelled() {
        return;
    }

    let entries = match list_dir(&shared.permits, &task.path) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("{}", err);
            shared.counters.record_error();
            return;
        }
    };
    shared.counters.record_dir();

    for entry in entries {
        if shared.is_cancelled() {
            return;
        }

        let outcome = match entry {
            Ok(entry) => visit_entry(shared, task, &entry),
            Err(err) => EntryOutcome::Failed(err),
        };

        match outcome {
            EntryOutcome::Accepted { path, size } => {
                shared.counters.record_bytes(size);
                if let Some(callback) = &shared.callback {
                    match panic::catch_unwind(AssertUnwindSafe(|| callback(&path))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => trace!("Callback failed for {}: {:#}", path.display(), e),
                        Err(_) => trace!("Callback panicked for {}", path.display()),
                    }
                }
                if results.send(path).is_err() {
                    // Consumer went away
                    shared.cancel();
                    return;
                }
            }
            EntryOutcome::Descend(child) => shared.frontier.push(child),
            EntryOutcome::Ignored => shared.counters.record_skip(),
            EntryOutcome::Rejected => {}
            EntryOutcome::Failed(err) => {
                trace!("{}", err);
                shared.counters.record_error();
            }
        }
    }
}

/// List a directory while holding a permit
///
/// The permit is released before any entry is examined.
fn list_dir(
    permits: &PermitPool,
    dir: &Path,
) -> Result<Vec<Result<DirEntry, EntryError>>, EntryError> {
    let _permit = permits.acquire();
    let read_dir = fs::read_dir(dir).map_err(|source| EntryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(read_dir
        .map(|entry| {
            entry.map_err(|source| EntryError::Stat {
                path: dir.to_path_buf(),
                source,
            })
        })
        .collect())
}

/// Classify one entry; ignore patterns run before any stat call
pub(crate) fn visit_entry(shared: &WalkShared, task: &DirTask, entry: &DirEntry) -> EntryOutcome {
    let path = entry.path();

    if shared.ignore.is_match(&path) {
        return EntryOutcome::Ignored;
    }

    let file_type = match entry.file_type() {
        Ok(file_type) => file_type,
        Err(source) => return EntryOutcome::Failed(EntryError::Stat { path, source }),
    };

    if file_type.is_symlink() {
        if !shared.follow_symlinks {
            return EntryOutcome::Rejected;
        }
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(source) => return EntryOutcome::Failed(EntryError::Stat { path, source }),
        };
        if metadata.is_dir() {
            return match fs::canonicalize(&path) {
                Ok(target) => descend(shared, task, target),
                Err(source) => EntryOutcome::Failed(EntryError::Stat { path, source }),
            };
        }
        return check_file(shared, path, Some(metadata));
    }

    if file_type.is_dir() {
        return descend(shared, task, path);
    }

    check_file(shared, path, None)
}

fn descend(shared: &WalkShared, task: &DirTask, dir: PathBuf) -> EntryOutcome {
    if task.depth + 1 > shared.max_depth {
        trace!("Depth limit reached at {}", dir.display());
        return EntryOutcome::Rejected;
    }

    if shared.follow_symlinks {
        let canonical = fs::canonicalize(&dir).unwrap_or_else(|_| dir.clone());
        if !shared.mark_visited(canonical) {
            debug!("Skipping already visited directory {}", dir.display());
            return EntryOutcome::Rejected;
        }
    }

    EntryOutcome::Descend(task.child(dir))
}

fn check_file(shared: &WalkShared, path: PathBuf, metadata: Option<Metadata>) -> EntryOutcome {
    if !shared.filter.matches_path(&path) {
        return EntryOutcome::Rejected;
    }

    let size = match metadata {
        Some(metadata) => metadata.len(),
        None => match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(source) => return EntryOutcome::Failed(EntryError::Stat { path, source }),
        },
    };

    if !shared.filter.matches(&path, size) {
        return EntryOutcome::Rejected;
    }

    EntryOutcome::Accepted { path, size }
}
