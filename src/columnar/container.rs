// Container format seam and its JSON implementation

use super::histogram::{DistributionFile, Histogram1D};
use super::FieldKind;
use crate::error::{RelValError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Reads per-event records and writes distributions for one on-disk format
pub trait ContainerFormat: Send + Sync {
    /// Read the record type `record_type` from the container at `path`
    fn read_records(&self, path: &Path, record_type: &str) -> Result<RecordTable>;

    /// Write `histograms` to `path`, replacing any existing content
    fn write_distributions(&self, path: &Path, histograms: &[Histogram1D]) -> Result<()>;
}

/// One named, typed column of per-event values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// One entry per event: a number, or an array of numbers for array fields
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            values,
        }
    }

    /// Numeric kind, `None` for columns excluded from comparison
    pub fn kind(&self) -> Option<FieldKind> {
        FieldKind::from_type_name(&self.type_name)
    }

    /// All values of this column, array entries flattened in event order
    pub fn numeric_values(&self) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.values.len());
        for value in &self.values {
            match value {
                Value::Array(items) => {
                    for item in items {
                        out.push(self.as_number(item)?);
                    }
                }
                other => out.push(self.as_number(other)?),
            }
        }
        Ok(out)
    }

    fn as_number(&self, value: &Value) -> Result<f64> {
        value.as_f64().ok_or_else(|| RelValError::FieldFill {
            field: self.name.clone(),
            reason: format!("non-numeric value {}", value),
        })
    }
}

/// Columns of one record type read from one container
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    pub name: String,
    pub columns: Vec<Column>,
}

impl RecordTable {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContainerDocument {
    #[serde(default)]
    records: BTreeMap<String, TableBody>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableBody {
    #[serde(default)]
    columns: Vec<Column>,
}

/// Containers stored as JSON documents
///
/// Records: `{"records": {"<type>": {"columns": [{"name", "type", "values"}]}}}`.
/// Distributions: `{"histograms": [...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonContainer;

impl JsonContainer {
    /// Write record tables to `path`
    pub fn write_records(&self, path: &Path, tables: &[RecordTable]) -> Result<()> {
        let doc = ContainerDocument {
            records: tables
                .iter()
                .map(|t| {
                    (
                        t.name.clone(),
                        TableBody {
                            columns: t.columns.clone(),
                        },
                    )
                })
                .collect(),
        };
        write_json(path, &doc)
    }

    /// Read a distribution file written by `write_distributions`
    pub fn read_distributions(&self, path: &Path) -> Result<Vec<Histogram1D>> {
        let text = std::fs::read_to_string(path).map_err(|e| RelValError::missing(path, e))?;
        let file: DistributionFile =
            serde_json::from_str(&text).map_err(|e| RelValError::missing(path, e))?;
        Ok(file.histograms)
    }
}

impl ContainerFormat for JsonContainer {
    fn read_records(&self, path: &Path, record_type: &str) -> Result<RecordTable> {
        let text = std::fs::read_to_string(path).map_err(|e| RelValError::missing(path, e))?;
        let mut doc: ContainerDocument =
            serde_json::from_str(&text).map_err(|e| RelValError::missing(path, e))?;

        let body = doc.records.remove(record_type).ok_or_else(|| {
            RelValError::missing(path, format!("no record type {}", record_type))
        })?;

        Ok(RecordTable {
            name: record_type.to_string(),
            columns: body.columns,
        })
    }

    fn write_distributions(&self, path: &Path, histograms: &[Histogram1D]) -> Result<()> {
        let file = DistributionFile {
            histograms: histograms.to_vec(),
        };
        write_json(path, &file)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_read_record_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("o2sim_Kine.root");
        std::fs::write(
            &path,
            json!({
                "records": {
                    "o2sim": {"columns": [
                        {"name": "x", "type": "Float_t", "values": [1.0, 2.5]},
                        {"name": "label", "type": "string", "values": ["a", "b"]}
                    ]},
                    "other": {"columns": []}
                }
            })
            .to_string(),
        )
        .unwrap();

        let table = JsonContainer.read_records(&path, "o2sim").unwrap();
        assert_eq!(table.name, "o2sim");
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.column("x").unwrap().kind(), Some(FieldKind::Float));
        assert_eq!(table.column("label").unwrap().kind(), None);
    }

    #[test]
    fn test_missing_record_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.root");
        std::fs::write(&path, r#"{"records": {}}"#).unwrap();

        let err = JsonContainer.read_records(&path, "o2sim").unwrap_err();
        assert!(matches!(err, RelValError::MissingArtifact { .. }));
    }

    #[test]
    fn test_unparsable_file_is_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.root");
        std::fs::write(&path, b"\x00\x01binary").unwrap();

        let err = JsonContainer.read_records(&path, "o2sim").unwrap_err();
        assert!(matches!(err, RelValError::MissingArtifact { .. }));
    }

    #[test]
    fn test_array_values_flatten() {
        let column = Column::new("hits", "Int_t", vec![json!(1), json!([2, 3]), json!([])]);
        assert_eq!(column.numeric_values().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_non_numeric_value_fails_fill() {
        let column = Column::new("x", "Float_t", vec![json!(1.0), json!("oops")]);
        let err = column.numeric_values().unwrap_err();
        assert!(matches!(err, RelValError::FieldFill { .. }));
    }

    #[test]
    fn test_records_written_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/hits.root");
        let table = RecordTable {
            name: "o2sim".into(),
            columns: vec![Column::new("y", "Double_t", vec![json!(4.0)])],
        };
        JsonContainer.write_records(&path, &[table.clone()]).unwrap();
        assert_eq!(JsonContainer.read_records(&path, "o2sim").unwrap(), table);
    }
}
