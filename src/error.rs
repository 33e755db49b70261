//! Error types for fastfind
//!
//! Only invalid input surfaces to callers. Per-entry filesystem failures are
//! carried as values ([`EntryError`]) and folded into scan statistics, and
//! cache failures are logged and absorbed by the tiers that hit them.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when a scan cannot start
#[derive(Error, Debug)]
pub enum ScanError {
    /// Root path is missing or is not a directory
    #[error("Invalid scan root '{}': {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },

    /// An ignore glob failed to compile
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// A walker thread could not be started
    #[error("Failed to spawn walker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ScanError {
    pub(crate) fn invalid_root(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the cache tiers
#[derive(Error, Debug)]
pub enum CacheError {
    /// SQLite rejected an operation
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error while touching cache files
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be serialized or deserialized
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Store refused a write (disk full, database locked)
    #[error("Failed to write cache entry '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: Box<CacheError>,
    },

    /// No user cache directory could be determined
    #[error("No cache directory available for this user")]
    NoCacheDir,
}

impl CacheError {
    pub(crate) fn write(key: &str, source: impl Into<CacheError>) -> Self {
        Self::Write {
            key: key.to_string(),
            source: Box::new(source.into()),
        }
    }
}

/// Errors loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No user config directory available")]
    NoConfigDir,
}

/// Failure on a single directory entry during a walk
///
/// Never aborts a scan; the walker counts it and moves on.
#[derive(Error, Debug)]
pub enum EntryError {
    /// Directory could not be listed
    #[error("Failed to list '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Entry metadata could not be fetched (permission denied, dangling link, raced delete)
    #[error("Failed to stat '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_root_message() {
        let err = ScanError::invalid_root("/nope", "does not exist");
        assert_eq!(err.to_string(), "Invalid scan root '/nope': does not exist");
    }

    #[test]
    fn test_write_error_wraps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = CacheError::write("abc", io);
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("disk full"));
    }
}
