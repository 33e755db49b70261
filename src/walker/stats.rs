//! Scan statistics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters shared by the walker threads
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub dirs_scanned: AtomicU64,
    pub files_skipped: AtomicU64,
    pub permission_errors: AtomicU64,
    pub total_bytes: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_dir(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.permission_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Freeze the counters into a final report
    pub(crate) fn snapshot(&self, files_found: u64, elapsed: Duration) -> ScanStats {
        ScanStats::new(
            files_found,
            self.dirs_scanned.load(Ordering::Relaxed),
            self.files_skipped.load(Ordering::Relaxed),
            self.permission_errors.load(Ordering::Relaxed),
            self.total_bytes.load(Ordering::Relaxed),
            elapsed,
        )
    }
}

/// Final statistics of a completed scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files_found: u64,
    pub dirs_scanned: u64,
    /// Entries dropped by ignore patterns
    pub files_skipped: u64,
    /// Listing and stat failures
    pub permission_errors: u64,
    /// Bytes across accepted files
    pub total_bytes: u64,
    pub elapsed: Duration,
    pub files_per_second: f64,
    pub bytes_per_second: f64,
    pub avg_file_size: f64,
}

impl ScanStats {
    fn new(
        files_found: u64,
        dirs_scanned: u64,
        files_skipped: u64,
        permission_errors: u64,
        total_bytes: u64,
        elapsed: Duration,
    ) -> Self {
        let secs = elapsed.as_secs_f64();
        let (files_per_second, bytes_per_second) = if secs > 0.0 {
            (files_found as f64 / secs, total_bytes as f64 / secs)
        } else {
            (0.0, 0.0)
        };
        let avg_file_size = if files_found > 0 {
            total_bytes as f64 / files_found as f64
        } else {
            0.0
        };

        Self {
            files_found,
            dirs_scanned,
            files_skipped,
            permission_errors,
            total_bytes,
            elapsed,
            files_per_second,
            bytes_per_second,
            avg_file_size,
        }
    }
}
