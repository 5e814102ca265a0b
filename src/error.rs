//! Error taxonomy for release validation
//!
//! Only conditions that stop an operation are errors. Schema drift between the
//! two sides and divergent file sizes are reported as warnings and data.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while comparing two simulation outputs
#[derive(Error, Debug)]
pub enum RelValError {
    /// Inputs are neither two files nor two valid simulation directories
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An artifact could not be opened or parsed
    #[error("Missing artifact {}: {reason}", path.display())]
    MissingArtifact { path: PathBuf, reason: String },

    /// Values of a field could not be turned into a distribution
    #[error("Cannot fill distribution for field {field}: {reason}")]
    FieldFill { field: String, reason: String },

    /// The external comparison primitive returned a non-zero status
    #[error("Comparison primitive exited with status {code} in {}", output_dir.display())]
    PrimitiveFailure { code: i32, output_dir: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelValError {
    pub(crate) fn missing(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MissingArtifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for release validation operations
pub type Result<T> = std::result::Result<T, RelValError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_message() {
        let err = RelValError::missing("/tmp/a.root", "no such file");
        assert_eq!(
            err.to_string(),
            "Missing artifact /tmp/a.root: no such file"
        );
    }

    #[test]
    fn test_primitive_failure_message() {
        let err = RelValError::PrimitiveFailure {
            code: 3,
            output_dir: PathBuf::from("out/hits"),
        };
        assert!(err.to_string().contains("status 3"));
        assert!(err.to_string().contains("out/hits"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RelValError = io.into();
        assert!(matches!(err, RelValError::Io(_)));
    }
}
