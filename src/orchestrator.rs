//! Full release validation over two inputs
//!
//! A run moves through `Init → SizeAudit → categories → Finalize`. Inputs are
//! either two comparable files, compared once, or two simulation directories,
//! compared category by category. Every category writes below its own output
//! subdirectory and every group below its own `<group>_dir`, so groups never
//! share files and can run on a worker pool (`jobs > 1`). A failing group is
//! recorded and never stops the remaining groups or categories.

use crate::columnar::{ColumnarReducer, ContainerFormat};
use crate::config::{CompareOptions, RelValConfig, DETECTORS_OF_INTEREST_HITS};
use crate::error::{RelValError, Result};
use crate::matcher::PathSetMatcher;
use crate::runner::{ComparisonRunner, VERDICT_FILE_NAME};
use crate::severity::Severity;
use crate::size_audit::{SizeAudit, SizeAuditor};
use crate::verdict::{find_verdicts, Summary};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Size report written to the output root
pub const SIZE_REPORT_FILE_NAME: &str = "file_sizes.json";

/// Severity summary written to the output root
pub const SUMMARY_FILE_NAME: &str = "SummaryToBeChecked.json";

/// Top-level marker of a simulation directory
const SIM_DIR_MARKER_PREFIX: &str = "pipeline";

/// One logical comparison domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Detector hits, one group per detector
    Hits,
    /// Reconstructed TPC tracks
    TpcTracks,
    /// Generator-level records
    Kine,
    /// Derived analysis histograms
    Analysis,
    /// Quality-control histograms
    Qc,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Hits,
        Category::TpcTracks,
        Category::Kine,
        Category::Analysis,
        Category::Qc,
    ];

    /// Key in the run summary
    pub fn summary_key(self) -> &'static str {
        match self {
            Category::Hits => "hist",
            Category::TpcTracks => "tpctracks",
            Category::Kine => "kine",
            Category::Analysis => "analysis",
            Category::Qc => "qc",
        }
    }

    /// Subdirectory of the output root
    pub fn output_dir_name(self) -> &'static str {
        match self {
            Category::Hits => "hits",
            Category::TpcTracks => "tpctracks",
            Category::Kine => "kine",
            Category::Analysis => "analysis",
            Category::Qc => "qc",
        }
    }

    /// Subdirectory of each input holding this category's files
    fn source_subdir(self) -> Option<&'static str> {
        match self {
            Category::Analysis => Some("Analysis"),
            Category::Qc => Some("QC"),
            _ => None,
        }
    }

    /// Record type reduced to distributions, `None` for histogram files
    fn record_type(self) -> Option<&'static str> {
        match self {
            Category::Hits | Category::Kine => Some("o2sim"),
            Category::TpcTracks => Some("tpcrec"),
            Category::Analysis | Category::Qc => None,
        }
    }

    fn pattern(self, extension: &str) -> String {
        match self {
            Category::Hits => format!("*Hits*.{}", extension),
            Category::TpcTracks => format!("tpctracks.{}", extension),
            Category::Kine => format!("*Kine.{}", extension),
            Category::Analysis | Category::Qc => format!("*.{}", extension),
        }
    }

    /// Categories to run; none requested means all of them
    pub fn resolve(requested: &[Category]) -> Vec<Category> {
        if requested.is_empty() {
            return Category::ALL.to_vec();
        }
        let mut categories = requested.to_vec();
        categories.sort();
        categories.dedup();
        categories
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.output_dir_name())
    }
}

/// How the two inputs are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Two comparable files, one comparison
    Files,
    /// Two simulation output directories
    SimDirs,
}

/// Stage of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    SizeAudit,
    Category(Category),
    Finalize,
}

/// Whether `path` is a simulation output directory
///
/// It must be a directory holding a top-level `pipeline*` entry.
pub fn is_sim_dir(path: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|e| {
        e.file_name()
            .to_string_lossy()
            .starts_with(SIM_DIR_MARKER_PREFIX)
    })
}

/// Two files or two simulation directories; anything else is invalid
pub fn detect_mode(a: &Path, b: &Path) -> Result<InputMode> {
    if a.is_file() && b.is_file() {
        Ok(InputMode::Files)
    } else if is_sim_dir(a) && is_sim_dir(b) {
        Ok(InputMode::SimDirs)
    } else {
        Err(RelValError::InvalidInput(format!(
            "please provide either 2 files or 2 simulation directories as input, got {} and {}",
            a.display(),
            b.display()
        )))
    }
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input_a: PathBuf,
    pub input_b: PathBuf,
    pub output: PathBuf,
    pub options: CompareOptions,
    /// Relative file size difference tolerated by the size audit
    pub size_threshold: f64,
    /// Requested categories; empty enables all
    pub categories: Vec<Category>,
    /// Detectors included in the hits comparison; empty means all known
    pub detectors: Vec<String>,
    /// Severities a verdict is flagged for
    pub severities: Vec<Severity>,
}

impl RunRequest {
    pub fn new(input_a: impl Into<PathBuf>, input_b: impl Into<PathBuf>, options: CompareOptions) -> Self {
        Self {
            input_a: input_a.into(),
            input_b: input_b.into(),
            output: PathBuf::from("."),
            options,
            size_threshold: 0.1,
            categories: Vec::new(),
            detectors: Vec::new(),
            severities: Severity::DEFAULT_FILTER.to_vec(),
        }
    }

    fn detectors(&self) -> Vec<String> {
        if self.detectors.is_empty() {
            DETECTORS_OF_INTEREST_HITS
                .iter()
                .map(|d| d.to_string())
                .collect()
        } else {
            let mut seen = BTreeSet::new();
            self.detectors
                .iter()
                .filter(|d| seen.insert(d.as_str()))
                .cloned()
                .collect()
        }
    }
}

/// A group or file whose comparison failed
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFailure {
    pub category: Option<Category>,
    pub group: String,
    pub error: String,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: InputMode,
    /// Categories that ran, in order
    pub categories: Vec<Category>,
    pub size_audit: Option<SizeAudit>,
    pub summary: Summary,
    pub failures: Vec<GroupFailure>,
    /// Primitive exit status in file mode, 0 in directory mode
    pub exit_code: i32,
}

/// Unit of work inside one category
#[derive(Debug, Clone, PartialEq)]
enum WorkItem {
    /// Reduce per-event records of both sides, then compare the distributions
    Reduce {
        name: String,
        record_type: &'static str,
        files_a: Vec<PathBuf>,
        files_b: Vec<PathBuf>,
    },
    /// Compare two histogram files as they are
    Direct { name: String, a: PathBuf, b: PathBuf },
}

impl WorkItem {
    fn name(&self) -> &str {
        match self {
            WorkItem::Reduce { name, .. } | WorkItem::Direct { name, .. } => name,
        }
    }
}

/// Drives size audit, per-category comparisons and aggregation
pub struct Orchestrator<F: ContainerFormat> {
    runner: ComparisonRunner,
    reducer: ColumnarReducer<F>,
    extension: String,
    jobs: usize,
}

impl<F: ContainerFormat> Orchestrator<F> {
    /// Fails with `Configuration` if the config is invalid or has no primitive
    pub fn new(config: &RelValConfig, format: F) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            runner: ComparisonRunner::new(&config.primitive)?,
            reducer: ColumnarReducer::new(format, config.bins),
            extension: config.container_extension.clone(),
            jobs: config.jobs,
        })
    }

    pub fn run(&self, request: &RunRequest) -> Result<RunReport> {
        enter(Stage::Init);
        request.options.thresholds.validate()?;
        let mode = detect_mode(&request.input_a, &request.input_b)?;
        std::fs::create_dir_all(&request.output)?;

        match mode {
            InputMode::Files => self.run_files(request),
            InputMode::SimDirs => self.run_sim_dirs(request),
        }
    }

    fn run_files(&self, request: &RunRequest) -> Result<RunReport> {
        let outcome = self.runner.compare(
            &request.input_a,
            &request.input_b,
            &request.options,
            &request.output,
        )?;

        Ok(RunReport {
            mode: InputMode::Files,
            categories: Vec::new(),
            size_audit: None,
            summary: Summary::default(),
            failures: Vec::new(),
            exit_code: outcome.exit_code,
        })
    }

    fn run_sim_dirs(&self, request: &RunRequest) -> Result<RunReport> {
        let mut failures = Vec::new();

        enter(Stage::SizeAudit);
        let size_audit = match SizeAuditor::new(self.extension.as_str(), request.size_threshold)
            .and_then(|auditor| auditor.audit(&[&request.input_a, &request.input_b]))
        {
            Ok(audit) => Some(audit),
            Err(e) => {
                tracing::warn!("Size audit failed: {}", e);
                failures.push(GroupFailure {
                    category: None,
                    group: "size audit".to_string(),
                    error: e.to_string(),
                });
                None
            }
        };

        let categories = Category::resolve(&request.categories);
        let mut summary = Summary::default();
        for &category in &categories {
            enter(Stage::Category(category));
            let category_dir = request.output.join(category.output_dir_name());
            match self.run_category(category, request, &category_dir) {
                Ok(mut group_failures) => failures.append(&mut group_failures),
                Err(e) => {
                    tracing::warn!("Category {} failed: {}", category, e);
                    failures.push(GroupFailure {
                        category: Some(category),
                        group: category.to_string(),
                        error: e.to_string(),
                    });
                }
            }
            summary.add(
                category.summary_key(),
                &find_verdicts(&category_dir),
                &request.severities,
            );
        }

        enter(Stage::Finalize);
        if let Some(audit) = &size_audit {
            let path = request.output.join(SIZE_REPORT_FILE_NAME);
            std::fs::write(&path, serde_json::to_string_pretty(&audit.report())?)?;
        }
        summary.write(&request.output.join(SUMMARY_FILE_NAME))?;

        Ok(RunReport {
            mode: InputMode::SimDirs,
            categories,
            size_audit,
            summary,
            failures,
            exit_code: 0,
        })
    }

    fn run_category(
        &self,
        category: Category,
        request: &RunRequest,
        category_dir: &Path,
    ) -> Result<Vec<GroupFailure>> {
        std::fs::create_dir_all(category_dir)?;

        let (dir_a, dir_b) = match category.source_subdir() {
            Some(sub) => (request.input_a.join(sub), request.input_b.join(sub)),
            None => (request.input_a.clone(), request.input_b.clone()),
        };

        let mut matcher = PathSetMatcher::new(&category.pattern(&self.extension))?;
        let detectors = request.detectors();
        if category == Category::Hits {
            matcher = matcher.with_filters(detectors.clone());
        }
        let files = matcher.match_pair(&dir_a, &dir_b)?;
        if files.is_empty() {
            tracing::warn!("No mutual files found for category {}", category);
        }

        let items = plan_work(category, &dir_a, &dir_b, &files, &detectors, &self.extension);
        let results = self.run_items(&items, category_dir, &request.options);

        Ok(items
            .iter()
            .zip(results)
            .filter_map(|(item, result)| {
                result.err().map(|e| {
                    tracing::warn!("{} group {} failed: {}", category, item.name(), e);
                    GroupFailure {
                        category: Some(category),
                        group: item.name().to_string(),
                        error: e.to_string(),
                    }
                })
            })
            .collect())
    }

    /// Run all items, sequentially or on a pool of `jobs` threads
    fn run_items(
        &self,
        items: &[WorkItem],
        category_dir: &Path,
        options: &CompareOptions,
    ) -> Vec<Result<()>> {
        let sequential = || -> Vec<Result<()>> {
            items
                .iter()
                .map(|item| self.run_item(item, category_dir, options))
                .collect()
        };

        if self.jobs <= 1 || items.len() <= 1 {
            return sequential();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
            Ok(pool) => pool.install(|| {
                items
                    .par_iter()
                    .map(|item| self.run_item(item, category_dir, options))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!("Cannot build worker pool, running sequentially: {}", e);
                sequential()
            }
        }
    }

    fn run_item(&self, item: &WorkItem, category_dir: &Path, options: &CompareOptions) -> Result<()> {
        let output_dir = category_dir.join(format!("{}_dir", item.name()));
        std::fs::create_dir_all(&output_dir)?;
        remove_stale_verdict(&output_dir)?;

        let (a, b) = match item {
            WorkItem::Reduce {
                record_type,
                files_a,
                files_b,
                ..
            } => {
                let out_a = output_dir.join(format!("file1.{}", self.extension));
                let out_b = output_dir.join(format!("file2.{}", self.extension));
                self.reducer
                    .reduce(files_a, files_b, &out_a, &out_b, record_type)?;
                (out_a, out_b)
            }
            WorkItem::Direct { a, b, .. } => (a.clone(), b.clone()),
        };

        self.runner
            .compare(&a, &b, options, &output_dir)?
            .into_result()?;
        Ok(())
    }
}

/// Split the mutual files of a category into work items
fn plan_work(
    category: Category,
    dir_a: &Path,
    dir_b: &Path,
    files: &[String],
    detectors: &[String],
    extension: &str,
) -> Vec<WorkItem> {
    let Some(record_type) = category.record_type() else {
        return files
            .iter()
            .map(|rel| WorkItem::Direct {
                name: rel.clone(),
                a: dir_a.join(rel),
                b: dir_b.join(rel),
            })
            .collect();
    };

    let groups: Vec<(String, Vec<&String>)> = match category {
        Category::Hits => detectors
            .iter()
            .map(|det| {
                let members = files
                    .iter()
                    .filter(|rel| {
                        hits_detector(file_name_of(rel), detectors) == Some(det.as_str())
                    })
                    .collect();
                (format!("Hits{}", det), members)
            })
            .collect(),
        Category::TpcTracks => vec![(format!("tpctracks.{}", extension), files.iter().collect())],
        _ => vec![(format!("Kine.{}", extension), files.iter().collect())],
    };

    groups
        .into_iter()
        .filter(|(_, members)| !members.is_empty())
        .map(|(name, members)| WorkItem::Reduce {
            name,
            record_type,
            files_a: members.iter().map(|rel| dir_a.join(rel)).collect(),
            files_b: members.iter().map(|rel| dir_b.join(rel)).collect(),
        })
        .collect()
}

/// Detector a hits file belongs to
///
/// `Hits<DET>` in the file name wins over `<DET>Hits`; among several matches
/// the first detector in `detectors` is taken, so a file joins one group only.
fn hits_detector<'a>(file_name: &str, detectors: &'a [String]) -> Option<&'a str> {
    let tagged = |format_tag: fn(&str) -> String| {
        detectors
            .iter()
            .find(|det| file_name.contains(&format_tag(det.as_str())))
            .map(String::as_str)
    };
    tagged(|det| format!("Hits{}", det)).or_else(|| tagged(|det| format!("{}Hits", det)))
}

/// Drop a verdict left by an earlier run into the same output tree
fn remove_stale_verdict(output_dir: &Path) -> Result<()> {
    match std::fs::remove_file(output_dir.join(VERDICT_FILE_NAME)) {
        Ok(()) => {
            tracing::debug!("Removed previous verdict in {}", output_dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn file_name_of(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn enter(stage: Stage) {
    tracing::debug!("Entering stage {:?}", stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sim_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pipeline_metrics.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn test_no_category_enables_all() {
        assert_eq!(Category::resolve(&[]), Category::ALL.to_vec());
    }

    #[test]
    fn test_requested_categories_sorted_and_unique() {
        let resolved = Category::resolve(&[Category::Qc, Category::Hits, Category::Qc]);
        assert_eq!(resolved, vec![Category::Hits, Category::Qc]);
    }

    #[test]
    fn test_summary_keys() {
        let keys: Vec<_> = Category::ALL.iter().map(|c| c.summary_key()).collect();
        assert_eq!(keys, ["hist", "tpctracks", "kine", "analysis", "qc"]);
    }

    #[test]
    fn test_is_sim_dir_needs_marker() {
        let with_marker = sim_dir();
        let without = TempDir::new().unwrap();
        assert!(is_sim_dir(with_marker.path()));
        assert!(!is_sim_dir(without.path()));
        assert!(!is_sim_dir(&with_marker.path().join("pipeline_metrics.json")));
    }

    #[test]
    fn test_detect_mode() {
        let a = sim_dir();
        let b = sim_dir();
        assert_eq!(detect_mode(a.path(), b.path()).unwrap(), InputMode::SimDirs);

        let fa = a.path().join("pipeline_metrics.json");
        let fb = b.path().join("pipeline_metrics.json");
        assert_eq!(detect_mode(&fa, &fb).unwrap(), InputMode::Files);

        let mixed = detect_mode(&fa, b.path());
        assert!(matches!(mixed, Err(RelValError::InvalidInput(_))));

        let plain = TempDir::new().unwrap();
        assert!(detect_mode(a.path(), plain.path()).is_err());
    }

    #[test]
    fn test_plan_hits_groups_per_detector() {
        let files = vec![
            "tf1/o2sim_HitsITS.root".to_string(),
            "tf1/o2sim_HitsTOF.root".to_string(),
            "tf2/o2sim_HitsITS.root".to_string(),
        ];
        let detectors = vec!["ITS".to_string(), "TOF".to_string(), "TRD".to_string()];
        let items = plan_work(
            Category::Hits,
            Path::new("/a"),
            Path::new("/b"),
            &files,
            &detectors,
            "root",
        );

        assert_eq!(items.len(), 2);
        match &items[0] {
            WorkItem::Reduce {
                name,
                record_type,
                files_a,
                files_b,
            } => {
                assert_eq!(name, "HitsITS");
                assert_eq!(*record_type, "o2sim");
                assert_eq!(
                    files_a,
                    &vec![
                        PathBuf::from("/a/tf1/o2sim_HitsITS.root"),
                        PathBuf::from("/a/tf2/o2sim_HitsITS.root")
                    ]
                );
                assert_eq!(files_b[0], PathBuf::from("/b/tf1/o2sim_HitsITS.root"));
            }
            other => panic!("unexpected work item {:?}", other),
        }
        assert_eq!(items[1].name(), "HitsTOF");
    }

    #[test]
    fn test_plan_hits_detector_prefix_naming() {
        let files = vec!["ITSHits.root".to_string()];
        let detectors = vec!["ITS".to_string(), "TPC".to_string()];
        let items = plan_work(
            Category::Hits,
            Path::new("/a"),
            Path::new("/b"),
            &files,
            &detectors,
            "root",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "HitsITS");
    }

    #[test]
    fn test_plan_hits_file_joins_one_group() {
        // "HitsTPC" names the group even though "ITS" appears too
        let files = vec!["ITS_run_HitsTPC.root".to_string()];
        let detectors = vec!["ITS".to_string(), "TPC".to_string()];
        let items = plan_work(
            Category::Hits,
            Path::new("/a"),
            Path::new("/b"),
            &files,
            &detectors,
            "root",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "HitsTPC");
    }

    #[test]
    fn test_hits_detector_lookup() {
        let detectors = vec!["ITS".to_string(), "TOF".to_string()];
        assert_eq!(hits_detector("o2sim_HitsTOF.root", &detectors), Some("TOF"));
        assert_eq!(hits_detector("TOFHits.root", &detectors), Some("TOF"));
        assert_eq!(hits_detector("o2sim_HitsTRD.root", &detectors), None);
        assert_eq!(hits_detector("ITS_HitsTOF.root", &detectors), Some("TOF"));
    }

    #[test]
    fn test_remove_stale_verdict() {
        let dir = TempDir::new().unwrap();
        let verdict = dir.path().join(VERDICT_FILE_NAME);
        std::fs::write(&verdict, "{}").unwrap();

        remove_stale_verdict(dir.path()).unwrap();
        assert!(!verdict.exists());
        // nothing to remove is fine
        remove_stale_verdict(dir.path()).unwrap();
    }

    #[test]
    fn test_plan_tpctracks_single_group() {
        let files = vec!["tf1/tpctracks.root".to_string(), "tf2/tpctracks.root".to_string()];
        let items = plan_work(
            Category::TpcTracks,
            Path::new("/a"),
            Path::new("/b"),
            &files,
            &[],
            "root",
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "tpctracks.root");
        assert!(matches!(
            &items[0],
            WorkItem::Reduce { record_type: "tpcrec", files_a, .. } if files_a.len() == 2
        ));
    }

    #[test]
    fn test_plan_qc_direct_per_file() {
        let files = vec!["ITS/qc.root".to_string(), "TPC.root".to_string()];
        let items = plan_work(
            Category::Qc,
            Path::new("/a/QC"),
            Path::new("/b/QC"),
            &files,
            &[],
            "root",
        );
        assert_eq!(
            items,
            vec![
                WorkItem::Direct {
                    name: "ITS/qc.root".into(),
                    a: PathBuf::from("/a/QC/ITS/qc.root"),
                    b: PathBuf::from("/b/QC/ITS/qc.root"),
                },
                WorkItem::Direct {
                    name: "TPC.root".into(),
                    a: PathBuf::from("/a/QC/TPC.root"),
                    b: PathBuf::from("/b/QC/TPC.root"),
                },
            ]
        );
    }

    #[test]
    fn test_empty_groups_dropped() {
        let items = plan_work(
            Category::Kine,
            Path::new("/a"),
            Path::new("/b"),
            &[],
            &[],
            "root",
        );
        assert!(items.is_empty());
    }

    #[test]
    fn test_detectors_default_and_dedup() {
        let options = CompareOptions::new(crate::config::TestMode::new(1).unwrap());
        let mut request = RunRequest::new("a", "b", options);
        assert_eq!(request.detectors().len(), DETECTORS_OF_INTEREST_HITS.len());

        request.detectors = vec!["TPC".into(), "ITS".into(), "TPC".into()];
        assert_eq!(request.detectors(), vec!["TPC".to_string(), "ITS".to_string()]);
    }

    #[test]
    fn test_orchestrator_requires_primitive() {
        let err = Orchestrator::new(&RelValConfig::default(), crate::columnar::JsonContainer);
        assert!(matches!(err, Err(RelValError::Configuration(_))));
    }
}
