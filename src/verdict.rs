//! Verdict inspection and severity aggregation
//!
//! A verdict is flagged as soon as any requested severity lists at least one
//! item. Which items matched is reported but never changes the outcome.

use crate::error::{RelValError, Result};
use crate::runner::VERDICT_FILE_NAME;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Verdict written by the comparison primitive
///
/// Only `test_summary` is interpreted; other fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Severity label → names of the items with that severity
    #[serde(default)]
    pub test_summary: BTreeMap<String, Vec<String>>,
}

impl Verdict {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RelValError::missing(path, e))?;
        serde_json::from_str(&text).map_err(|e| RelValError::missing(path, e))
    }

    /// Items listed under `severity`
    pub fn items(&self, severity: Severity) -> &[String] {
        self.test_summary
            .get(severity.label())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Requested severities with a non-empty item list, in request order
    pub fn flagged<'a>(&'a self, severities: &'a [Severity]) -> Vec<(Severity, &'a [String])> {
        severities
            .iter()
            .map(|&s| (s, self.items(s)))
            .filter(|(_, items)| !items.is_empty())
            .collect()
    }

    pub fn has_any(&self, severities: &[Severity]) -> bool {
        !self.flagged(severities).is_empty()
    }
}

/// Whether the verdict at `path` lists items under any of `severities`
///
/// Matching item names are logged.
pub fn has_severity(path: &Path, severities: &[Severity]) -> Result<bool> {
    let verdict = Verdict::from_file(path)?;
    let flagged = verdict.flagged(severities);
    for (severity, items) in &flagged {
        tracing::info!(
            "{}: items with severity {}: {}",
            path.display(),
            severity,
            items.join(", ")
        );
    }
    Ok(!flagged.is_empty())
}

/// Flagged verdicts among `paths`
///
/// A verdict that cannot be read is logged and left out.
pub fn aggregate<P: AsRef<Path>>(paths: &[P], severities: &[Severity]) -> Vec<PathBuf> {
    let mut flagged = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match has_severity(path, severities) {
            Ok(true) => flagged.push(path.to_path_buf()),
            Ok(false) => {}
            Err(e) => tracing::warn!("{}", e),
        }
    }
    flagged
}

/// All verdict files below `dir`, sorted
pub fn find_verdicts(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == VERDICT_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Category → flagged verdict paths, persisted as `SummaryToBeChecked.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary {
    pub categories: BTreeMap<String, Vec<PathBuf>>,
}

impl Summary {
    /// Record the flagged subset of `paths` under `category`
    ///
    /// The key is present even when nothing is flagged.
    pub fn add<P: AsRef<Path>>(&mut self, category: &str, paths: &[P], severities: &[Severity]) {
        self.categories
            .insert(category.to_string(), aggregate(paths, severities));
    }

    pub fn get(&self, category: &str) -> Option<&[PathBuf]> {
        self.categories.get(category).map(Vec::as_slice)
    }

    pub fn flagged_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.flagged_count() == 0
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
