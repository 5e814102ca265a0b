//! Run configuration
//!
//! Values come from an optional TOML file and are then overridden by command
//! line flags. Nothing in the library reads the process environment.

use crate::error::{RelValError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Detectors whose hit files take part in a hits comparison
pub const DETECTORS_OF_INTEREST_HITS: [&str; 15] = [
    "ITS", "TOF", "EMC", "TRD", "PHS", "FT0", "HMP", "MFT", "FDD", "FV0", "MCH", "MID", "CPV",
    "ZDC", "TPC",
];

/// External comparison primitive
///
/// # Example
/// ```
/// use relval::config::PrimitiveConfig;
///
/// let primitive = PrimitiveConfig::new("/opt/relval/compare-histograms");
/// assert!(primitive.args.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimitiveConfig {
    /// Executable invoked for every comparison
    pub program: Option<PathBuf>,

    /// Arguments placed before the comparison arguments
    ///
    /// Used when the primitive is a script run by an interpreter, e.g.
    /// `program = "sh"`, `args = ["compare.sh"]`.
    pub args: Vec<String>,
}

impl PrimitiveConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Settings shared by every stage of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelValConfig {
    pub primitive: PrimitiveConfig,

    /// Extension of detector container files, without the dot
    pub container_extension: String,

    /// Number of bins of every derived distribution
    pub bins: usize,

    /// Worker threads for per-group comparisons (1 = sequential)
    pub jobs: usize,
}

impl Default for RelValConfig {
    fn default() -> Self {
        Self {
            primitive: PrimitiveConfig::default(),
            container_extension: "root".to_string(),
            bins: 100,
            jobs: 1,
        }
    }
}

impl RelValConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RelValError::missing(path, e))?;
        let config: RelValConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.container_extension.is_empty() || self.container_extension.starts_with('.') {
            return Err(RelValError::Configuration(format!(
                "container_extension must be a bare extension like \"root\", got {:?}",
                self.container_extension
            )));
        }

        if self.bins == 0 {
            return Err(RelValError::Configuration(
                "bins must be >= 1".to_string(),
            ));
        }

        if self.jobs == 0 {
            return Err(RelValError::Configuration(
                "jobs must be >= 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Statistical test variant run by the primitive (1 to 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TestMode(u8);

impl TestMode {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 7;

    pub fn new(mode: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&mode) {
            Ok(Self(mode))
        } else {
            Err(RelValError::Configuration(format!(
                "test mode must be in [{}, {}], got {}",
                Self::MIN,
                Self::MAX,
                mode
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for TestMode {
    type Error = RelValError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TestMode> for u8 {
    fn from(mode: TestMode) -> u8 {
        mode.0
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thresholds handed to the comparison primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub chi2: f64,
    /// Relative difference in mean
    pub rel_mean_diff: f64,
    /// Relative difference in number of entries
    pub rel_entries_diff: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            chi2: 1.5,
            rel_mean_diff: 1.5,
            rel_entries_diff: 0.01,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("chi2", self.chi2),
            ("rel_mean_diff", self.rel_mean_diff),
            ("rel_entries_diff", self.rel_entries_diff),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RelValError::Configuration(format!(
                    "{} threshold must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Everything that shapes a single comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    pub test: TestMode,
    pub thresholds: Thresholds,
    /// Dump critical items to a separate file
    pub select_critical: bool,
    pub no_plots: bool,
}

impl CompareOptions {
    pub fn new(test: TestMode) -> Self {
        Self {
            test,
            thresholds: Thresholds::default(),
            select_critical: false,
            no_plots: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RelValConfig::default();
        assert_eq!(config.container_extension, "root");
        assert_eq!(config.bins, 100);
        assert_eq!(config.jobs, 1);
        assert!(config.primitive.program.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bins = 50
jobs = 4

[primitive]
program = "sh"
args = ["compare.sh"]
"#
        )
        .unwrap();

        let config = RelValConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bins, 50);
        assert_eq!(config.jobs, 4);
        assert_eq!(config.container_extension, "root");
        assert_eq!(config.primitive.program, Some(PathBuf::from("sh")));
        assert_eq!(config.primitive.args, vec!["compare.sh".to_string()]);
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        assert_eq!(RelValConfig::load(None).unwrap(), RelValConfig::default());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = RelValConfig::from_file(Path::new("/nonexistent/relval.toml")).unwrap_err();
        assert!(matches!(err, RelValError::MissingArtifact { .. }));
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_bins() {
        let mut config = RelValConfig::default();
        config.bins = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[allow(clippy::field_reassign_with_default)]
    fn test_invalid_extension() {
        let mut config = RelValConfig::default();
        config.container_extension = ".root".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_mode_range() {
        assert!(TestMode::new(0).is_err());
        assert_eq!(TestMode::new(1).unwrap().get(), 1);
        assert_eq!(TestMode::new(7).unwrap().get(), 7);
        assert!(TestMode::new(8).is_err());
    }

    #[test]
    fn test_default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.chi2, 1.5);
        assert_eq!(t.rel_mean_diff, 1.5);
        assert_eq!(t.rel_entries_diff, 0.01);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let t = Thresholds {
            chi2: -1.0,
            ..Thresholds::default()
        };
        assert!(t.validate().is_err());
    }
}
