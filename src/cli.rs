//! CLI argument parsing for relval

use crate::config::{CompareOptions, RelValConfig, TestMode, Thresholds, DETECTORS_OF_INTEREST_HITS};
use crate::error::Result;
use crate::orchestrator::{Category, RunRequest};
use crate::severity::Severity;
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relval")]
#[command(version)]
#[command(about = "Compare detector-simulation outputs and flag significant differences", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare 2 files or 2 simulation directories
    #[command(name = "rel-val")]
    RelVal(RelValArgs),

    /// Check a verdict (Summary.json) for given severities
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct RelValArgs {
    /// 2 input files OR 2 simulation directories
    #[arg(short, long, num_args = 2, required = true, value_name = "PATH")]
    pub input: Vec<PathBuf>,

    /// Index of the test case
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=7))]
    pub test: u8,

    /// Chi2 threshold
    #[arg(long = "chi2-value", default_value_t = 1.5)]
    pub chi2_value: f64,

    /// Threshold of relative difference in mean
    #[arg(long, default_value_t = 1.5)]
    pub rel_mean_diff: f64,

    /// Threshold of relative difference in number of entries
    #[arg(long, default_value_t = 0.01)]
    pub rel_entries_diff: f64,

    /// Select the critical items and dump them to a file
    #[arg(long)]
    pub select_critical: bool,

    /// How far file sizes may diverge before warning
    #[arg(long, default_value_t = 0.1)]
    pub threshold: f64,

    /// Include hits comparison
    #[arg(long)]
    pub with_hits: bool,

    /// Include TPC tracks comparison
    #[arg(long)]
    pub with_tpctracks: bool,

    /// Include generator-level (kine) comparison
    #[arg(long)]
    pub with_kine: bool,

    /// Include analysis comparison
    #[arg(long)]
    pub with_analysis: bool,

    /// Include QC comparison
    #[arg(long)]
    pub with_qc: bool,

    /// Detectors included in the hits comparison (default: all)
    #[arg(long, num_args = 0.., value_parser = PossibleValuesParser::new(DETECTORS_OF_INTEREST_HITS))]
    pub detectors: Vec<String>,

    /// Disable plotting
    #[arg(long)]
    pub no_plots: bool,

    /// Output directory
    #[arg(short, long, default_value = "./")]
    pub output: PathBuf,

    /// Severities a verdict is flagged for in the run summary
    #[arg(long, value_enum, num_args = 1.., default_values_t = Severity::DEFAULT_FILTER)]
    pub severity: Vec<Severity>,

    /// External comparison primitive
    #[arg(long, env = "RELVAL_PRIMITIVE", value_name = "PROGRAM")]
    pub primitive: Option<PathBuf>,

    /// Argument passed to the primitive before the comparison arguments (repeatable)
    #[arg(long = "primitive-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub primitive_args: Vec<String>,

    /// Number of bins of derived distributions
    #[arg(long, value_name = "N")]
    pub bins: Option<usize>,

    /// Worker threads for per-group comparisons
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

impl RelValArgs {
    /// Explicitly enabled categories (empty if none)
    pub fn categories(&self) -> Vec<Category> {
        [
            (self.with_hits, Category::Hits),
            (self.with_tpctracks, Category::TpcTracks),
            (self.with_kine, Category::Kine),
            (self.with_analysis, Category::Analysis),
            (self.with_qc, Category::Qc),
        ]
        .into_iter()
        .filter_map(|(enabled, category)| enabled.then_some(category))
        .collect()
    }

    pub fn compare_options(&self) -> Result<CompareOptions> {
        let thresholds = Thresholds {
            chi2: self.chi2_value,
            rel_mean_diff: self.rel_mean_diff,
            rel_entries_diff: self.rel_entries_diff,
        };
        thresholds.validate()?;

        Ok(CompareOptions {
            test: TestMode::new(self.test)?,
            thresholds,
            select_critical: self.select_critical,
            no_plots: self.no_plots,
        })
    }

    /// Override configuration file values with flags given on the command line
    pub fn apply_to(&self, config: &mut RelValConfig) {
        if let Some(program) = &self.primitive {
            config.primitive.program = Some(program.clone());
        }
        if !self.primitive_args.is_empty() {
            config.primitive.args = self.primitive_args.clone();
        }
        if let Some(bins) = self.bins {
            config.bins = bins;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
    }

    pub fn to_request(&self) -> Result<RunRequest> {
        let mut request = RunRequest::new(
            self.input[0].clone(),
            self.input[1].clone(),
            self.compare_options()?,
        );
        request.output = self.output.clone();
        request.size_threshold = self.threshold;
        request.categories = self.categories();
        request.detectors = self.detectors.clone();
        request.severities = self.severity.clone();
        Ok(request)
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Verdict JSON produced by rel-val
    pub file: PathBuf,

    /// Severity levels to search for
    #[arg(long, value_enum, num_args = 0.., default_values_t = Severity::DEFAULT_FILTER)]
    pub severity: Vec<Severity>,
}
