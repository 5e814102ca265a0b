//! Invocation of the external comparison primitive
//!
//! The primitive is an executable receiving typed positional arguments:
//!
//! ```text
//! <program> [leading args...] <file A> <file B> <test> <chi2> <rel mean diff>
//!           <rel entries diff> <select critical> <no plots>
//! ```
//!
//! Paths are absolute, booleans are `true`/`false`. It runs with the output
//! directory as working directory and writes its verdict (`Summary.json`) and
//! optional plots there. No timeout is enforced: a primitive that never exits
//! blocks the run.

use crate::config::{CompareOptions, PrimitiveConfig};
use crate::error::{RelValError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// File name of the verdict written by the primitive
pub const VERDICT_FILE_NAME: &str = "Summary.json";

/// Result of one primitive invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonOutcome {
    /// Exit code (-1 if terminated by a signal)
    pub exit_code: i32,

    /// Directory holding the verdict and plots
    pub output_dir: PathBuf,

    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ComparisonOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn verdict_path(&self) -> PathBuf {
        self.output_dir.join(VERDICT_FILE_NAME)
    }

    /// Turn a non-zero exit into `PrimitiveFailure`
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(RelValError::PrimitiveFailure {
                code: self.exit_code,
                output_dir: self.output_dir,
            })
        }
    }
}

/// Runs the comparison primitive on pairs of artifacts
#[derive(Debug, Clone)]
pub struct ComparisonRunner {
    program: PathBuf,
    leading_args: Vec<String>,
}

impl ComparisonRunner {
    /// Fails with `Configuration` when no primitive program is set
    pub fn new(config: &PrimitiveConfig) -> Result<Self> {
        let program = config
            .program
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                RelValError::Configuration(
                    "no comparison primitive configured (use --primitive, RELVAL_PRIMITIVE or [primitive] program)"
                        .to_string(),
                )
            })?;

        Ok(Self {
            program,
            leading_args: config.args.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument vector passed after the program for comparing `a` with `b`
    pub fn arguments(&self, a: &Path, b: &Path, options: &CompareOptions) -> Result<Vec<OsString>> {
        let a = absolute_artifact(a)?;
        let b = absolute_artifact(b)?;
        let t = &options.thresholds;

        let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();
        args.push(a.into_os_string());
        args.push(b.into_os_string());
        args.extend(
            [
                options.test.to_string(),
                t.chi2.to_string(),
                t.rel_mean_diff.to_string(),
                t.rel_entries_diff.to_string(),
                options.select_critical.to_string(),
                options.no_plots.to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        Ok(args)
    }

    /// Compare `a` with `b`, writing all artifacts into `output_dir`
    ///
    /// Blocks until the primitive exits. A non-zero exit is returned in the
    /// outcome, not as an error; failing to start the primitive is an error.
    pub fn compare(
        &self,
        a: &Path,
        b: &Path,
        options: &CompareOptions,
        output_dir: &Path,
    ) -> Result<ComparisonOutcome> {
        std::fs::create_dir_all(output_dir)?;
        let args = self.arguments(a, b, options)?;

        tracing::info!(
            "Running {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let start = Instant::now();
        let status = Command::new(&self.program)
            .args(&args)
            .current_dir(output_dir)
            .status()
            .map_err(|e| {
                RelValError::Configuration(format!(
                    "cannot start comparison primitive {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let outcome = ComparisonOutcome {
            exit_code: status.code().unwrap_or(-1),
            output_dir: output_dir.to_path_buf(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        if !outcome.passed() {
            tracing::warn!(
                "Comparison primitive exited with status {} in {}",
                outcome.exit_code,
                output_dir.display()
            );
        }
        Ok(outcome)
    }
}

fn absolute_artifact(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| RelValError::missing(path, e))
}
