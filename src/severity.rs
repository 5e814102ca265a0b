//! Severity labels assigned by the comparison primitive

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a discrepancy between two compared items, mildest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum Severity {
    #[serde(rename = "GOOD")]
    #[value(name = "GOOD")]
    Good,
    #[serde(rename = "WARNING")]
    #[value(name = "WARNING")]
    Warning,
    #[serde(rename = "BAD")]
    #[value(name = "BAD")]
    Bad,
    /// Critical item that could not be compared
    #[serde(rename = "CRIT_NC")]
    #[value(name = "CRIT_NC")]
    CritNc,
    /// Non-critical item that could not be compared
    #[serde(rename = "NONCRIT_NC")]
    #[value(name = "NONCRIT_NC")]
    NoncritNc,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Good,
        Severity::Warning,
        Severity::Bad,
        Severity::CritNc,
        Severity::NoncritNc,
    ];

    /// Severities a run is checked against unless told otherwise
    pub const DEFAULT_FILTER: [Severity; 2] = [Severity::Bad, Severity::CritNc];

    /// Label as written in verdict artifacts
    pub fn label(self) -> &'static str {
        match self {
            Severity::Good => "GOOD",
            Severity::Warning => "WARNING",
            Severity::Bad => "BAD",
            Severity::CritNc => "CRIT_NC",
            Severity::NoncritNc => "NONCRIT_NC",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.label() == s)
            .ok_or_else(|| format!("Unknown severity: {}", s))
    }
}
