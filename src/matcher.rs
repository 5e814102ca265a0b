//! Discovery of files present under every compared location
//!
//! A pattern is matched against file names anywhere below a root, the same
//! way `root/**/pattern` would glob. Matches are normalized to `/`-separated
//! paths relative to their root before the intersection is taken.

use crate::error::Result;
use globset::{Glob, GlobMatcher};
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// Finds relative paths matching a file name pattern in all given locations
///
/// # Example
/// ```no_run
/// use relval::matcher::PathSetMatcher;
///
/// let hits = PathSetMatcher::new("*Hits*.root")
///     .unwrap()
///     .with_filters(vec!["ITS".to_string()])
///     .find_mutual(&["run_a", "run_b"])
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PathSetMatcher {
    pattern: GlobMatcher,
    /// Substrings of which a match must contain at least one (None = keep all)
    filters: Option<Vec<String>>,
}

impl PathSetMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Glob::new(pattern)?.compile_matcher(),
            filters: None,
        })
    }

    /// Keep only paths containing at least one of `filters`
    ///
    /// An empty list disables filtering.
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = if filters.is_empty() {
            None
        } else {
            Some(filters)
        };
        self
    }

    /// Relative paths present under both locations
    pub fn match_pair(&self, a: &Path, b: &Path) -> Result<Vec<String>> {
        self.find_mutual(&[a, b])
    }

    /// Relative paths present under every location, sorted and deduplicated
    ///
    /// A location that does not exist contributes no files, so the result is
    /// empty. An empty result is returned as-is for the caller to judge.
    pub fn find_mutual<P: AsRef<Path>>(&self, roots: &[P]) -> Result<Vec<String>> {
        let mut roots = roots.iter();
        let Some(first) = roots.next() else {
            return Ok(Vec::new());
        };

        let mut intersection = self.collect(first.as_ref());
        for root in roots {
            if intersection.is_empty() {
                break;
            }
            let found = self.collect(root.as_ref());
            intersection.retain(|rel| found.contains(rel));
        }

        if let Some(filters) = &self.filters {
            intersection.retain(|rel| filters.iter().any(|f| rel.contains(f.as_str())));
        }

        Ok(intersection.into_iter().collect())
    }

    fn collect(&self, root: &Path) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        if !root.is_dir() {
            tracing::debug!("{} is not a directory, no files collected", root.display());
            return found;
        }

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry below {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.pattern.is_match(entry.file_name()) {
                continue;
            }

            if let Ok(relative) = entry.path().strip_prefix(root) {
                found.insert(to_slash_path(relative));
            }
        }

        found
    }
}

/// Render a relative path with `/` separators regardless of platform
fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn two_trees(a_files: &[&str], b_files: &[&str]) -> (TempDir, TempDir) {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for f in a_files {
            touch(a.path(), f);
        }
        for f in b_files {
            touch(b.path(), f);
        }
        (a, b)
    }

    #[test]
    fn test_intersection_is_relative_and_sorted() {
        let (a, b) = two_trees(
            &["tf2/o2sim_HitsTOF.root", "tf1/o2sim_HitsITS.root", "only_a.root"],
            &["tf1/o2sim_HitsITS.root", "tf2/o2sim_HitsTOF.root", "only_b.root"],
        );

        let matcher = PathSetMatcher::new("*.root").unwrap();
        let found = matcher.match_pair(a.path(), b.path()).unwrap();
        assert_eq!(
            found,
            vec!["tf1/o2sim_HitsITS.root", "tf2/o2sim_HitsTOF.root"]
        );
    }

    #[test]
    fn test_pattern_applies_to_file_name() {
        let (a, b) = two_trees(
            &["o2sim_Kine.root", "o2sim_HitsITS.root", "Kine.json"],
            &["o2sim_Kine.root", "o2sim_HitsITS.root", "Kine.json"],
        );

        let matcher = PathSetMatcher::new("*Kine.root").unwrap();
        let found = matcher.match_pair(a.path(), b.path()).unwrap();
        assert_eq!(found, vec!["o2sim_Kine.root"]);
    }

    #[test]
    fn test_filters_keep_any_match_without_duplicates() {
        let files = [
            "o2sim_HitsITS.root",
            "o2sim_HitsTOF.root",
            "o2sim_HitsTRD.root",
        ];
        let (a, b) = two_trees(&files, &files);

        let matcher = PathSetMatcher::new("*Hits*.root")
            .unwrap()
            .with_filters(vec!["ITS".into(), "TOF".into(), "Hits".into()]);
        let found = matcher.match_pair(a.path(), b.path()).unwrap();
        assert_eq!(found.len(), 3);

        let matcher = PathSetMatcher::new("*Hits*.root")
            .unwrap()
            .with_filters(vec!["TRD".into()]);
        let found = matcher.match_pair(a.path(), b.path()).unwrap();
        assert_eq!(found, vec!["o2sim_HitsTRD.root"]);
    }

    #[test]
    fn test_empty_filters_disable_filtering() {
        let (a, b) = two_trees(&["x.root"], &["x.root"]);
        let matcher = PathSetMatcher::new("*.root").unwrap().with_filters(vec![]);
        assert_eq!(matcher.match_pair(a.path(), b.path()).unwrap(), vec!["x.root"]);
    }

    #[test]
    fn test_missing_root_yields_empty() {
        let (a, _b) = two_trees(&["x.root"], &[]);
        let matcher = PathSetMatcher::new("*.root").unwrap();
        let found = matcher
            .match_pair(a.path(), Path::new("/nonexistent/relval/dir"))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_three_way_intersection() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let c = TempDir::new().unwrap();
        for root in [a.path(), b.path(), c.path()] {
            touch(root, "common.root");
        }
        touch(a.path(), "ab.root");
        touch(b.path(), "ab.root");

        let matcher = PathSetMatcher::new("*.root").unwrap();
        let found = matcher
            .find_mutual(&[a.path(), b.path(), c.path()])
            .unwrap();
        assert_eq!(found, vec!["common.root"]);
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        assert!(PathSetMatcher::new("[unclosed").is_err());
    }
}
