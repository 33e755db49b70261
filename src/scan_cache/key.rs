//! Cache key derivation

use crate::filters::FilterSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Bumped whenever the cached value layout changes
pub const CACHE_SCHEMA_VERSION: &str = "2.0";

/// Deterministic fingerprint of a query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct KeyData<'a> {
    path: String,
    filters: BTreeMap<&'static str, serde_json::Value>,
    cache_version: &'a str,
}

impl CacheKey {
    /// Derive the key for `path` queried with `filters`
    ///
    /// The path goes through [`normalize_path`]; null filter fields are left
    /// out so unset and absent filters hash the same.
    pub fn derive(path: &Path, filters: &FilterSet) -> Self {
        Self::derive_with(path, filters, BTreeMap::new())
    }

    /// Like [`CacheKey::derive`], with extra fields that shape the result
    /// (walker options) merged into the filter map
    pub fn derive_with(
        path: &Path,
        filters: &FilterSet,
        extra: BTreeMap<&'static str, serde_json::Value>,
    ) -> Self {
        let mut fields = filters.to_key_fields();
        fields.extend(extra);
        let data = KeyData {
            path: normalize_path(path).to_string_lossy().into_owned(),
            filters: fields,
            cache_version: CACHE_SCHEMA_VERSION,
        };
        // Strings and a BTreeMap of JSON values do not fail to serialize
        let encoded = serde_json::to_string(&data).unwrap_or_else(|_| {
            format!("{}|{:?}|{}", data.path, data.filters, data.cache_version)
        });
        Self(blake3::hash(encoded.as_bytes()).to_hex().to_string())
    }

    /// Wrap an already-derived key
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Absolute form of `path`, relative paths joined onto the working directory
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonical form of `path` when it exists, its absolute form otherwise
///
/// Symlinks, `.` and `..` are resolved, so every spelling of an existing
/// directory maps to one cache entry.
pub fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| absolute_path(path))
}
