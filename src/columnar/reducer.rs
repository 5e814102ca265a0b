// Merge both sides' containers and reduce every shared numeric field

use super::container::{ContainerFormat, RecordTable};
use super::histogram::Histogram1D;
use super::NumericField;
use crate::error::{RelValError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// All records of one record type across the files of one side
#[derive(Debug, Clone)]
pub struct Dataset {
    pub record_type: String,
    tables: Vec<(PathBuf, RecordTable)>,
}

impl Dataset {
    /// Chain `files` into one dataset
    ///
    /// Files that cannot be opened are logged and skipped.
    pub fn chain<F, P>(format: &F, files: &[P], record_type: &str) -> Self
    where
        F: ContainerFormat + ?Sized,
        P: AsRef<Path>,
    {
        let mut tables = Vec::with_capacity(files.len());
        for file in files {
            let path = file.as_ref();
            match format.read_records(path, record_type) {
                Ok(table) => tables.push((path.to_path_buf(), table)),
                Err(e) => tracing::warn!("{}", e),
            }
        }
        Self {
            record_type: record_type.to_string(),
            tables,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Numeric fields, taken from the first file of the chain
    pub fn numeric_fields(&self) -> BTreeSet<NumericField> {
        let Some((_, first)) = self.tables.first() else {
            return BTreeSet::new();
        };
        first
            .columns
            .iter()
            .filter_map(|c| c.kind().map(|kind| NumericField::new(c.name.clone(), kind)))
            .collect()
    }

    /// Values of `field` across every file, in chain order
    pub fn values(&self, field: &NumericField) -> Result<Vec<f64>> {
        let mut out = Vec::new();
        for (path, table) in &self.tables {
            let column = table.column(&field.name).ok_or_else(|| RelValError::FieldFill {
                field: field.name.clone(),
                reason: format!("column missing in {}", path.display()),
            })?;
            out.extend(column.numeric_values()?);
        }
        Ok(out)
    }
}

/// What a reduction produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReduceOutcome {
    /// Distribution names written to both outputs, sorted
    pub reduced: Vec<String>,
    /// Fields dropped because filling failed on either side
    pub skipped: Vec<String>,
    /// The two sides had different numeric field sets
    pub schema_mismatch: bool,
}

/// Reduces two collections of containers to like-for-like distributions
pub struct ColumnarReducer<F: ContainerFormat> {
    format: F,
    bins: usize,
}

impl<F: ContainerFormat> ColumnarReducer<F> {
    pub fn new(format: F, bins: usize) -> Self {
        Self {
            format,
            bins: bins.max(1),
        }
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    /// Reduce `files_a` and `files_b` into `output_a` and `output_b`
    ///
    /// Fields are processed in sorted order. When the numeric field sets
    /// differ only the intersection is reduced. Side B's histogram for a
    /// field is always an empty copy of side A's, so both share binning.
    pub fn reduce<P: AsRef<Path>>(
        &self,
        files_a: &[P],
        files_b: &[P],
        output_a: &Path,
        output_b: &Path,
        record_type: &str,
    ) -> Result<ReduceOutcome> {
        let dataset_a = Dataset::chain(&self.format, files_a, record_type);
        let dataset_b = Dataset::chain(&self.format, files_b, record_type);

        for (files, dataset) in [(files_a, &dataset_a), (files_b, &dataset_b)] {
            if dataset.is_empty() {
                let path = files
                    .first()
                    .map(|f| f.as_ref().to_path_buf())
                    .unwrap_or_default();
                return Err(RelValError::missing(
                    path,
                    format!("no readable {} records", record_type),
                ));
            }
        }

        let fields_a = dataset_a.numeric_fields();
        let fields_b = dataset_b.numeric_fields();
        let schema_mismatch = fields_a != fields_b;
        let fields: Vec<NumericField> = if schema_mismatch {
            tracing::warn!(
                "Found different fields for record type {} in input files, comparing the {} common ones",
                record_type,
                fields_a.intersection(&fields_b).count()
            );
            fields_a.intersection(&fields_b).cloned().collect()
        } else {
            fields_a.into_iter().collect()
        };

        let mut outcome = ReduceOutcome {
            schema_mismatch,
            ..ReduceOutcome::default()
        };
        let mut hists_a = Vec::with_capacity(fields.len());
        let mut hists_b = Vec::with_capacity(fields.len());

        for field in &fields {
            match self.reduce_field(field, &dataset_a, &dataset_b) {
                Ok((a, b)) => {
                    outcome.reduced.push(a.name.clone());
                    hists_a.push(a);
                    hists_b.push(b);
                }
                Err(e) => {
                    tracing::warn!("Skipping field {}: {}", field.name, e);
                    outcome.skipped.push(field.name.clone());
                }
            }
        }

        self.format.write_distributions(output_a, &hists_a)?;
        self.format.write_distributions(output_b, &hists_b)?;

        tracing::debug!(
            "Reduced {} fields of {} ({} skipped)",
            outcome.reduced.len(),
            record_type,
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    fn reduce_field(
        &self,
        field: &NumericField,
        dataset_a: &Dataset,
        dataset_b: &Dataset,
    ) -> Result<(Histogram1D, Histogram1D)> {
        let values_a = dataset_a.values(field)?;
        let hist_a = Histogram1D::auto_binned(field.artifact_name(), &values_a, self.bins);

        let values_b = dataset_b.values(field)?;
        let mut hist_b = hist_a.empty_like();
        hist_b.fill_all(&values_b);

        Ok((hist_a, hist_b))
    }
}
