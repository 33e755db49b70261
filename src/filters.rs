//! File filters
//!
//! Filters form a closed set so they can be tested exhaustively and folded
//! into cache keys. [`FilterSet`] is the serializable query form;
//! [`FilterSet::pipeline`] turns it into an ordered [`Filter`] chain.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Single predicate applied to a discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// File name contains the substring
    Name(String),
    /// File name ends with the suffix (`.rs`, `tar.gz`, ...)
    Extension(String),
    /// Size within the inclusive bounds
    SizeRange { min: Option<u64>, max: Option<u64> },
    /// All inner filters match, evaluated in order
    All(Vec<Filter>),
}

impl Filter {
    /// Check the path-only part of the filter
    ///
    /// Size predicates pass here; they are decided by [`Filter::matches`].
    pub fn matches_path(&self, path: &Path) -> bool {
        match self {
            Self::Name(needle) => file_name(path).is_some_and(|n| n.contains(needle.as_str())),
            Self::Extension(suffix) => {
                file_name(path).is_some_and(|n| n.ends_with(suffix.as_str()))
            }
            Self::SizeRange { .. } => true,
            Self::All(filters) => filters.iter().all(|f| f.matches_path(path)),
        }
    }

    /// Full check, short-circuiting on the first failing predicate
    pub fn matches(&self, path: &Path, size: u64) -> bool {
        match self {
            Self::SizeRange { min, max } => {
                min.map_or(true, |min| size >= min) && max.map_or(true, |max| size <= max)
            }
            Self::All(filters) => filters.iter().all(|f| f.matches(path, size)),
            other => other.matches_path(path),
        }
    }
}

fn file_name(path: &Path) -> Option<std::borrow::Cow<'_, str>> {
    path.file_name().map(|n| n.to_string_lossy())
}

/// Query filters as supplied by callers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    pub name: Option<String>,
    pub extension: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Caller-registered ignore globs; `None` means the default set
    pub ignore: Option<Vec<String>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }

    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn with_ignore(mut self, patterns: Vec<String>) -> Self {
        self.ignore = Some(patterns);
        self
    }

    /// Ordered predicate chain: name, extension, then size range
    pub fn pipeline(&self) -> Filter {
        let mut filters = Vec::new();
        if let Some(name) = &self.name {
            filters.push(Filter::Name(name.clone()));
        }
        if let Some(ext) = &self.extension {
            filters.push(Filter::Extension(ext.clone()));
        }
        if self.min_size.is_some() || self.max_size.is_some() {
            filters.push(Filter::SizeRange {
                min: self.min_size,
                max: self.max_size,
            });
        }
        Filter::All(filters)
    }

    /// Non-null fields in sorted order, for key derivation
    pub fn to_key_fields(&self) -> BTreeMap<&'static str, serde_json::Value> {
        let mut fields = BTreeMap::new();
        if let Some(name) = &self.name {
            fields.insert("name", serde_json::Value::from(name.as_str()));
        }
        if let Some(ext) = &self.extension {
            fields.insert("ext", serde_json::Value::from(ext.as_str()));
        }
        if let Some(min) = self.min_size {
            fields.insert("min_size", serde_json::Value::from(min));
        }
        if let Some(max) = self.max_size {
            fields.insert("max_size", serde_json::Value::from(max));
        }
        if let Some(ignore) = &self.ignore {
            let mut sorted = ignore.clone();
            sorted.sort();
            fields.insert("ignore", serde_json::Value::from(sorted));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn test_name_is_substring_of_file_name_only() {
        let f = Filter::Name("report".into());
        assert!(f.matches_path(&p("/data/q1_report.txt")));
        assert!(!f.matches_path(&p("/report/q1.txt")));
    }

    #[test]
    fn test_extension_is_suffix() {
        let f = Filter::Extension(".rs".into());
        assert!(f.matches_path(&p("/src/main.rs")));
        assert!(!f.matches_path(&p("/src/main.rsx")));
        assert!(Filter::Extension("tar.gz".into()).matches_path(&p("/a/b.tar.gz")));
    }

    #[test]
    fn test_size_range_bounds_are_inclusive() {
        let f = Filter::SizeRange {
            min: Some(10),
            max: Some(20),
        };
        assert!(!f.matches(&p("/a"), 9));
        assert!(f.matches(&p("/a"), 10));
        assert!(f.matches(&p("/a"), 20));
        assert!(!f.matches(&p("/a"), 21));
        assert!(f.matches_path(&p("/a")));
    }

    #[test]
    fn test_pipeline_applies_every_predicate() {
        let filters = FilterSet::new()
            .with_name("log")
            .with_extension(".txt")
            .with_min_size(5);
        let pipeline = filters.pipeline();

        assert!(pipeline.matches(&p("/x/app_log.txt"), 5));
        assert!(!pipeline.matches(&p("/x/app_log.txt"), 4));
        assert!(!pipeline.matches(&p("/x/app_log.csv"), 50));
        assert!(!pipeline.matches(&p("/x/app.txt"), 50));
    }

    #[test]
    fn test_empty_pipeline_accepts_everything() {
        let pipeline = FilterSet::new().pipeline();
        assert_eq!(pipeline, Filter::All(Vec::new()));
        assert!(pipeline.matches(&p("/anything"), 0));
    }

    #[test]
    fn test_key_fields_skip_nulls_and_sort_ignore() {
        let filters = FilterSet::new()
            .with_extension(".py")
            .with_ignore(vec!["b/**".into(), "a/**".into()]);
        let fields = filters.to_key_fields();

        assert_eq!(fields.keys().copied().collect::<Vec<_>>(), vec!["ext", "ignore"]);
        assert_eq!(fields["ignore"], serde_json::json!(["a/**", "b/**"]));
    }
}
