// Columnar reduction: per-event records → comparable distributions
//
// Detector output stores one record type (tree) per container file, each
// with named, typed columns. Reduction merges all files of one side into a
// dataset, keeps the numeric columns both sides share, and bins every column
// into a histogram whose binning is derived from side A only.
//
// The container format itself sits behind `ContainerFormat` so the reducer
// never depends on how records are laid out on disk.

mod container;
mod histogram;
mod reducer;

pub use container::{Column, ContainerFormat, JsonContainer, RecordTable};
pub use histogram::{DistributionFile, Histogram1D};
pub use reducer::{ColumnarReducer, Dataset, ReduceOutcome};

use serde::{Deserialize, Serialize};

/// Primitive kind of a numeric column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKind {
    UInt,
    Int,
    Float,
    Double,
}

impl FieldKind {
    /// Map a container type name to a numeric kind
    ///
    /// Returns `None` for non-numeric types, which never take part in a
    /// comparison.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "UInt" | "UInt_t" => Some(FieldKind::UInt),
            "Int" | "Int_t" => Some(FieldKind::Int),
            "Float" | "Float_t" => Some(FieldKind::Float),
            "Double" | "Double_t" | "Double32_t" => Some(FieldKind::Double),
            _ => None,
        }
    }
}

/// One numeric column of a record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumericField {
    pub name: String,
    pub kind: FieldKind,
}

impl NumericField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Name used for the derived distribution
    pub fn artifact_name(&self) -> String {
        self.name.replace('.', "_")
    }
}
