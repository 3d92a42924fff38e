// ============================================================
// Layer 6 — Prediction Table
// ============================================================
// The canonical patient-level prediction CSV, shared by every
// subcommand that produces or consumes predictions:
//
//   PATIENT,fold,true_label,pred_label,prob_<cat0>,prob_<cat1>,...
//
// One row per patient. `fold` is empty outside cross-validation
// and `true_label` is empty for patients without usable ground
// truth. Probability columns appear in category (= class index)
// order, so the column header doubles as the category list when
// the table is read back for ROC analysis.

use std::fs;
use std::path::Path;

use crate::domain::error::{PipelineError, Result};
use crate::domain::records::PredictionRecord;

/// Write the prediction table. Creates parent directories. Written
/// through csv::Writer so ids and labels containing delimiters or
/// quotes survive the round trip.
pub fn write_predictions(
    path:        &Path,
    records:     &[PredictionRecord],
    categories:  &[String],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PipelineError::io(parent.display().to_string(), e))?;
    }

    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![
        "PATIENT".to_string(),
        "fold".to_string(),
        "true_label".to_string(),
        "pred_label".to_string(),
    ];
    header.extend(categories.iter().map(|c| format!("prob_{c}")));
    writer.write_record(&header)?;

    for r in records {
        let mut row = vec![
            r.patient_id.clone(),
            r.fold.map(|f| f.to_string()).unwrap_or_default(),
            r.true_label.clone().unwrap_or_default(),
            r.pred_label.clone(),
        ];
        row.extend(r.probs.iter().map(|p| format!("{p:.6}")));
        writer.write_record(&row)?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;

    tracing::info!("wrote {} predictions to '{}'", records.len(), path.display());
    Ok(())
}

/// Read a prediction table back. The category order is recovered
/// from the prob_* column headers.
pub fn read_predictions(path: &Path) -> Result<(Vec<PredictionRecord>, Vec<String>)> {
    let file = fs::File::open(path)
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    let categories: Vec<String> = headers
        .iter()
        .filter_map(|h| h.strip_prefix("prob_").map(str::to_string))
        .collect();
    if categories.is_empty() {
        return Err(PipelineError::Data(format!(
            "'{}' has no prob_* columns, is it a prediction table?",
            path.display()
        )));
    }
    let first_prob = headers
        .iter()
        .position(|h| h.starts_with("prob_"))
        .unwrap_or(headers.len());

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let cell = |i: usize| row.get(i).unwrap_or("").trim();

        let fold = match cell(1) {
            "" => None,
            s => Some(s.parse::<usize>().map_err(|_| {
                PipelineError::Data(format!(
                    "'{}' row {}: fold '{s}' is not an integer",
                    path.display(),
                    line + 2
                ))
            })?),
        };

        let mut probs = Vec::with_capacity(categories.len());
        for col in first_prob..first_prob + categories.len() {
            let s = cell(col);
            let p = s.parse::<f64>().map_err(|_| {
                PipelineError::Data(format!(
                    "'{}' row {}: probability '{s}' is not a number",
                    path.display(),
                    line + 2
                ))
            })?;
            probs.push(p);
        }

        records.push(PredictionRecord {
            patient_id: cell(0).to_string(),
            fold,
            true_label: match cell(2) {
                "" => None,
                s => Some(s.to_string()),
            },
            pred_label: cell(3).to_string(),
            probs,
        });
    }

    Ok((records, categories))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, fold: Option<usize>, truth: Option<&str>) -> PredictionRecord {
        PredictionRecord {
            patient_id: id.into(),
            fold,
            true_label: truth.map(str::to_string),
            pred_label: "pos".into(),
            probs:      vec![0.25, 0.75],
        }
    }

    #[test]
    fn test_write_then_read_preserves_table() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out").join("patient-preds.csv");
        let categories = vec!["neg".to_string(), "pos".to_string()];
        let records = vec![
            record("p1", Some(0), Some("pos")),
            record("p2", None, None),
        ];

        write_predictions(&path, &records, &categories).unwrap();
        let (read, read_cats) = read_predictions(&path).unwrap();

        assert_eq!(read_cats, categories);
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].patient_id, "p1");
        assert_eq!(read[0].fold, Some(0));
        assert_eq!(read[0].true_label.as_deref(), Some("pos"));
        assert_eq!(read[1].fold, None);
        assert_eq!(read[1].true_label, None);
        assert!((read[0].probs[1] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_patient_id_with_comma_survives_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("preds.csv");
        let categories = vec!["neg".to_string(), "pos".to_string()];
        let records = vec![PredictionRecord {
            patient_id: "smith, john".into(),
            fold:       Some(1),
            true_label: Some("pos".into()),
            pred_label: "pos".into(),
            probs:      vec![0.1, 0.9],
        }];

        write_predictions(&path, &records, &categories).unwrap();
        let (read, read_cats) = read_predictions(&path).unwrap();

        assert_eq!(read_cats, categories);
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].patient_id, "smith, john");
        assert_eq!(read[0].fold, Some(1));
        assert_eq!(read[0].true_label.as_deref(), Some("pos"));
        assert!((read[0].probs[0] - 0.1).abs() < 1e-9);
        assert!((read[0].probs[1] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_read_rejects_table_without_prob_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("not-preds.csv");
        fs::write(&path, "PATIENT,age\np1,70\n").unwrap();
        assert!(matches!(read_predictions(&path), Err(PipelineError::Data(_))));
    }

    #[test]
    fn test_read_rejects_malformed_probability() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.csv");
        fs::write(
            &path,
            "PATIENT,fold,true_label,pred_label,prob_a,prob_b\np1,,a,a,oops,0.5\n",
        )
        .unwrap();
        assert!(matches!(read_predictions(&path), Err(PipelineError::Data(_))));
    }
}
