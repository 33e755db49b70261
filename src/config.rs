//! Configuration file handling
//!
//! Settings live in `config.toml` under the user's config directory. Every
//! field has a default, so a missing file or a partial file is fine.

use crate::error::ConfigError;
use crate::filters::FilterSet;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APPLICATION: &str = "fastfind";
const CONFIG_FILE: &str = "config.toml";

/// Recursion ceiling when none is configured
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub cache: CacheConfig,
}

/// Walker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Hard recursion ceiling, root is depth 0
    pub max_depth: usize,
    /// Permits in the listing pool
    pub max_concurrent: usize,
    /// Worker threads pulling from the frontier
    pub workers: usize,
    /// Traverse symlinked directories
    pub follow_symlinks: bool,
    /// Ignore globs; empty installs the default set
    pub ignore: Vec<String>,
}

impl ScanConfig {
    /// Empty filter set carrying the configured ignore globs, if any
    pub fn base_filters(&self) -> FilterSet {
        if self.ignore.is_empty() {
            FilterSet::new()
        } else {
            FilterSet::new().with_ignore(self.ignore.clone())
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_concurrent: 100,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            follow_symlinks: false,
            ignore: Vec::new(),
        }
    }
}

/// Cache tier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache root; defaults to the user cache directory
    pub dir: Option<PathBuf>,
    pub memory_ttl_secs: u64,
    pub memory_max_entries: usize,
    pub persistent_ttl_secs: u64,
    pub dir_state_max_age_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            memory_ttl_secs: 300,
            memory_max_entries: 1000,
            persistent_ttl_secs: 3600,
            dir_state_max_age_days: 7,
        }
    }
}

impl CacheConfig {
    /// Config rooted at an explicit directory, other settings default
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn persistent_ttl(&self) -> Duration {
        Duration::from_secs(self.persistent_ttl_secs)
    }

    pub fn dir_state_max_age(&self) -> Duration {
        Duration::from_secs(self.dir_state_max_age_days.saturating_mul(24 * 3600))
    }

    /// Resolve the cache root, falling back to the per-user cache directory
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.cache_dir().to_path_buf()))
    }
}

impl Config {
    /// Load from the default location, or defaults if no file exists
    pub fn load() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = default_config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

/// Path of `config.toml` in the user config directory
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join(CONFIG_FILE))
}
