//! File size drift between validation runs
//!
//! A cheap first signal before any statistical comparison runs: container
//! files present in every location are compared by size, pairwise.

use crate::error::{RelValError, Result};
use crate::matcher::PathSetMatcher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persisted size report, flagged files only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeReport {
    pub directories: Vec<PathBuf>,
    /// Relative path → size under each directory, in directory order
    pub files: BTreeMap<String, Vec<u64>>,
    pub threshold: f64,
}

/// Sizes of one mutual file
#[derive(Debug, Clone, PartialEq)]
pub struct SizeRow {
    pub path: String,
    pub sizes: Vec<u64>,
    /// Location index pairs whose relative difference exceeds the threshold
    pub exceeding: Vec<(usize, usize)>,
}

impl SizeRow {
    pub fn is_flagged(&self) -> bool {
        !self.exceeding.is_empty()
    }
}

/// Full audit result, including files that passed
#[derive(Debug, Clone, PartialEq)]
pub struct SizeAudit {
    pub directories: Vec<PathBuf>,
    pub threshold: f64,
    pub rows: Vec<SizeRow>,
}

impl SizeAudit {
    pub fn flagged(&self) -> impl Iterator<Item = &SizeRow> {
        self.rows.iter().filter(|r| r.is_flagged())
    }

    pub fn report(&self) -> SizeReport {
        SizeReport {
            directories: self.directories.clone(),
            files: self
                .flagged()
                .map(|r| (r.path.clone(), r.sizes.clone()))
                .collect(),
            threshold: self.threshold,
        }
    }

    /// Render every row as an aligned table
    pub fn to_table_string(&self) -> String {
        let mut widths = vec![0usize; self.directories.len() + 1];
        for row in &self.rows {
            widths[0] = widths[0].max(row.path.len());
            for (i, size) in row.sizes.iter().enumerate() {
                widths[i + 1] = widths[i + 1].max(size.to_string().len());
            }
        }

        let header = self
            .directories
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(" | ");

        let mut table = format!("\n| {} |\n\n", header);
        for row in &self.rows {
            let mut line = format!("| {:<width$}", row.path, width = widths[0]);
            for (i, size) in row.sizes.iter().enumerate() {
                line.push_str(&format!(" | {:<width$}", size, width = widths[i + 1]));
            }
            line.push_str(" |");

            if row.is_flagged() {
                line.push_str(&format!(
                    "  <==  EXCEEDING threshold of {} at columns {:?} |",
                    self.threshold, row.exceeding
                ));
            } else {
                line.push_str(" OK |");
            }
            table.push_str(&line);
            table.push('\n');
        }
        table
    }
}

/// Compares sizes of mutual container files across locations
#[derive(Debug, Clone)]
pub struct SizeAuditor {
    extension: String,
    threshold: f64,
}

impl SizeAuditor {
    pub fn new(extension: impl Into<String>, threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(RelValError::Configuration(format!(
                "size threshold must be finite and non-negative, got {}",
                threshold
            )));
        }
        Ok(Self {
            extension: extension.into(),
            threshold,
        })
    }

    pub fn audit<P: AsRef<Path>>(&self, locations: &[P]) -> Result<SizeAudit> {
        let matcher = PathSetMatcher::new(&format!("*.{}", self.extension))?;
        let mutual = matcher.find_mutual(locations)?;

        let mut rows = Vec::with_capacity(mutual.len());
        for rel in mutual {
            let sizes = match sizes_of(locations, &rel) {
                Ok(sizes) => sizes,
                Err(e) => {
                    tracing::warn!("Skipping {} in size audit: {}", rel, e);
                    continue;
                }
            };

            let exceeding = exceeding_difference_thresh(&sizes, self.threshold);
            if !exceeding.is_empty() {
                tracing::warn!(
                    "Size of {} diverges beyond {} between locations {:?}: {:?}",
                    rel,
                    self.threshold,
                    exceeding,
                    sizes
                );
            }
            rows.push(SizeRow {
                path: rel,
                sizes,
                exceeding,
            });
        }

        Ok(SizeAudit {
            directories: locations.iter().map(|l| l.as_ref().to_path_buf()).collect(),
            threshold: self.threshold,
            rows,
        })
    }
}

/// Size of `rel` under each location, in location order
fn sizes_of<P: AsRef<Path>>(locations: &[P], rel: &str) -> Result<Vec<u64>> {
    locations
        .iter()
        .map(|loc| {
            let path = loc.as_ref().join(rel);
            std::fs::metadata(&path)
                .map(|meta| meta.len())
                .map_err(|e| RelValError::missing(&path, e))
        })
        .collect()
}

/// Index pairs `(i, j)`, `i < j`, whose sizes diverge by more than `threshold`
///
/// The absolute difference is taken relative to each of the two sizes and the
/// pair is flagged if either ratio exceeds the threshold, which makes the
/// check independent of location order. Zero against non-zero is always
/// flagged, zero against zero never is.
pub fn exceeding_difference_thresh(sizes: &[u64], threshold: f64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..sizes.len() {
        for j in (i + 1)..sizes.len() {
            if sizes_diverge(sizes[i], sizes[j], threshold) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

fn sizes_diverge(a: u64, b: u64, threshold: f64) -> bool {
    match (a, b) {
        (0, 0) => false,
        (0, _) | (_, 0) => true,
        _ => {
            let diff = a.abs_diff(b) as f64;
            diff / a as f64 > threshold || diff / b as f64 > threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_exceeding_pairs() {
        let pairs = exceeding_difference_thresh(&[100, 105, 300], 0.1);
        assert_eq!(pairs, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_zero_sizes() {
        assert_eq!(exceeding_difference_thresh(&[0, 10], 0.5), vec![(0, 1)]);
        assert_eq!(exceeding_difference_thresh(&[10, 0], 0.5), vec![(0, 1)]);
        assert!(exceeding_difference_thresh(&[0, 0], 0.5).is_empty());
    }

    #[test]
    fn test_check_is_order_independent() {
        // 100 vs 111: 11/111 < 0.1 but 11/100 > 0.1
        assert_eq!(exceeding_difference_thresh(&[100, 111], 0.1), vec![(0, 1)]);
        assert_eq!(exceeding_difference_thresh(&[111, 100], 0.1), vec![(0, 1)]);
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(SizeAuditor::new("root", -0.1).is_err());
        assert!(SizeAuditor::new("root", f64::NAN).is_err());
    }

    #[test]
    fn test_audit_reports_flagged_only() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("same.root"), vec![0u8; 100]).unwrap();
        fs::write(b.path().join("same.root"), vec![0u8; 102]).unwrap();
        fs::write(a.path().join("grown.root"), vec![0u8; 100]).unwrap();
        fs::write(b.path().join("grown.root"), vec![0u8; 400]).unwrap();
        fs::write(a.path().join("ignored.txt"), vec![0u8; 1]).unwrap();
        fs::write(b.path().join("ignored.txt"), vec![0u8; 1000]).unwrap();

        let auditor = SizeAuditor::new("root", 0.1).unwrap();
        let audit = auditor.audit(&[a.path(), b.path()]).unwrap();
        assert_eq!(audit.rows.len(), 2);

        let report = audit.report();
        assert_eq!(report.threshold, 0.1);
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files["grown.root"], vec![100, 400]);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["files"]["grown.root"].is_array());
        assert_eq!(json["directories"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_sizes_of_unreadable_file_is_error() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("x.root"), vec![0u8; 10]).unwrap();

        assert_eq!(sizes_of(&[a.path()], "x.root").unwrap(), vec![10]);
        let err = sizes_of(&[a.path(), b.path()], "x.root").unwrap_err();
        assert!(matches!(err, RelValError::MissingArtifact { .. }));
    }

    #[test]
    fn test_table_marks_rows() {
        let audit = SizeAudit {
            directories: vec![PathBuf::from("a"), PathBuf::from("b")],
            threshold: 0.1,
            rows: vec![
                SizeRow {
                    path: "ok.root".into(),
                    sizes: vec![10, 10],
                    exceeding: vec![],
                },
                SizeRow {
                    path: "bad.root".into(),
                    sizes: vec![10, 50],
                    exceeding: vec![(0, 1)],
                },
            ],
        };

        let table = audit.to_table_string();
        assert!(table.contains("| a | b |"));
        assert!(table.contains("OK |"));
        assert!(table.contains("EXCEEDING threshold of 0.1 at columns [(0, 1)]"));
    }
}
