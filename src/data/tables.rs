// ============================================================
// Layer 4 — Table Loaders
// ============================================================
// Loads the two delimited inputs of the pipeline:
//
//   clinical table — one row per patient; required PATIENT column,
//                    caller-named target and covariate columns
//   slide index    — one row per slide; PATIENT and FILENAME columns
//
// Parsing policy:
//   - empty cells become None (missing), never empty strings
//   - a duplicate patient id is a DataError (unique-key invariant)
//   - a non-empty continuous cell that fails to parse is a DataError
//     naming the patient and column; genuinely missing values are
//     only rejected later, for patients the join actually retains
//
// Reference: csv crate documentation

use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::error::{PipelineError, Result};
use crate::domain::records::{ClinicalRecord, SlideIndexEntry};

/// Required patient-id column in both tables.
pub const PATIENT_COL: &str = "PATIENT";

/// Slide-id column in the slide index.
pub const FILENAME_COL: &str = "FILENAME";

/// Column names the caller selected in the clinical table.
#[derive(Debug, Clone)]
pub struct ClinicalColumns {
    pub target:      String,
    pub cat_labels:  Vec<String>,
    pub cont_labels: Vec<String>,
}

/// Load the clinical table, one ClinicalRecord per patient row.
pub fn load_clinical(path: &Path, cols: &ClinicalColumns) -> Result<Vec<ClinicalRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| match e.kind() {
            csv::ErrorKind::Io(_) => {
                PipelineError::Data(format!("cannot open clinical table '{}'", path.display()))
            }
            _ => PipelineError::Csv(e),
        })?;

    let headers = reader.headers()?.clone();
    let patient_idx = column_index(&headers, PATIENT_COL, path)?;
    let target_idx  = column_index(&headers, &cols.target, path)?;
    let cat_idx: Vec<usize> = cols
        .cat_labels
        .iter()
        .map(|c| column_index(&headers, c, path))
        .collect::<Result<_>>()?;
    let cont_idx: Vec<usize> = cols
        .cont_labels
        .iter()
        .map(|c| column_index(&headers, c, path))
        .collect::<Result<_>>()?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row?;
        let patient_id = cell(&row, patient_idx).ok_or_else(|| {
            PipelineError::Data(format!(
                "clinical table '{}': row with empty {PATIENT_COL}",
                path.display()
            ))
        })?;

        // Patient identifier is the unique key of the clinical table
        if !seen.insert(patient_id.clone()) {
            return Err(PipelineError::Data(format!(
                "clinical table '{}': duplicate patient id '{patient_id}'",
                path.display()
            )));
        }

        let cont_values = cols
            .cont_labels
            .iter()
            .zip(&cont_idx)
            .map(|(name, &i)| parse_continuous(&row, i, name, &patient_id))
            .collect::<Result<Vec<_>>>()?;

        records.push(ClinicalRecord {
            target:     cell(&row, target_idx),
            cat_values: cat_idx.iter().map(|&i| cell(&row, i)).collect(),
            cont_values,
            patient_id,
        });
    }

    tracing::info!("Loaded {} clinical rows from '{}'", records.len(), path.display());
    Ok(records)
}

/// Load the slide index, one SlideIndexEntry per slide row.
pub fn load_slide_index(path: &Path) -> Result<Vec<SlideIndexEntry>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| match e.kind() {
            csv::ErrorKind::Io(_) => {
                PipelineError::Data(format!("cannot open slide index '{}'", path.display()))
            }
            _ => PipelineError::Csv(e),
        })?;

    let headers     = reader.headers()?.clone();
    let patient_idx = column_index(&headers, PATIENT_COL, path)?;
    let slide_idx   = column_index(&headers, FILENAME_COL, path)?;

    let mut entries = Vec::new();
    for row in reader.records() {
        let row = row?;
        let (Some(slide_id), Some(patient_id)) = (cell(&row, slide_idx), cell(&row, patient_idx))
        else {
            tracing::warn!(
                "slide index '{}': skipping row with empty slide/patient id",
                path.display()
            );
            continue;
        };
        entries.push(SlideIndexEntry { slide_id, patient_id });
    }

    tracing::info!("Loaded {} slide index rows from '{}'", entries.len(), path.display());
    Ok(entries)
}

fn column_index(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        PipelineError::Data(format!(
            "table '{}' has no column '{name}' (found: {})",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(", ")
        ))
    })
}

/// Empty cells are missing values, not empty strings.
fn cell(row: &csv::StringRecord, idx: usize) -> Option<String> {
    row.get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_continuous(
    row:     &csv::StringRecord,
    idx:     usize,
    column:  &str,
    patient: &str,
) -> Result<Option<f64>> {
    match cell(row, idx) {
        None => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(|_| {
            PipelineError::Data(format!(
                "patient '{patient}': continuous column '{column}' has non-numeric value '{s}'"
            ))
        }),
    }
}
