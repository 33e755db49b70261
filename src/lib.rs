//! fastfind library crate
//!
//! Concurrency-bounded file finding with a multi-tier result cache. The
//! `fastfind` binary is a thin shell over [`scanner::Scanner`].

pub mod cli;
pub mod config;
pub mod error;
pub mod filters;
pub mod progress;
pub mod scan_cache;
pub mod scanner;
pub mod walker;

pub use error::{CacheError, ConfigError, EntryError, ScanError};
pub use filters::{Filter, FilterSet};
pub use scan_cache::CacheManager;
pub use scanner::{ScanOutcome, Scanner};
pub use walker::{ScanResult, ScanStats, WalkOptions, Walker};
