//! Relval - release validation for detector-simulation outputs
//!
//! This library compares two sets of simulation output (single files or
//! whole simulation directories) and flags statistically significant
//! differences. It discovers comparable files, reduces per-event records to
//! histograms with shared binning, hands each pair to an external comparison
//! primitive and aggregates the resulting verdicts by severity.

pub mod cli;
pub mod columnar;
pub mod config;
pub mod error;
pub mod matcher;
pub mod orchestrator;
pub mod runner;
pub mod severity;
pub mod size_audit;
pub mod verdict;

pub use error::{RelValError, Result};
pub use orchestrator::{Orchestrator, RunReport, RunRequest};
pub use severity::Severity;
