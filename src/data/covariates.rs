// ============================================================
// Layer 4 — Covariate Encoder
// ============================================================
// Turns a patient's clinical covariates into one flat numeric
// vector that is concatenated with the pooled bag embedding:
//
//   categorical — one-hot over the vocabulary observed at
//                 training time, plus a trailing explicit
//                 "unknown" slot; unseen deploy-time values map
//                 to that slot, never silently dropped
//   continuous  — passed through as-is, no imputation; a missing
//                 required value is a DataError naming the patient
//
// The fitted vocabularies are part of the ModelArtifact, so the
// encoder is Serialize/Deserialize and deployment re-creates the
// exact same encoding the model was trained with.

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, Result};
use crate::domain::records::ClinicalRecord;

/// The fitted vocabulary of one categorical covariate column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovariateVocab {
    pub name: String,

    /// Sorted distinct values observed during fitting. The one-hot
    /// width is values.len() + 1; the extra slot encodes "unknown".
    pub values: Vec<String>,
}

impl CovariateVocab {
    fn slot(&self, value: Option<&str>) -> usize {
        match value {
            Some(v) => self
                .values
                .iter()
                .position(|known| known == v)
                .unwrap_or(self.values.len()),
            None => self.values.len(),
        }
    }
}

/// Encodes categorical + continuous covariates into a flat vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovariateEncoder {
    pub cat:  Vec<CovariateVocab>,
    pub cont: Vec<String>,
}

impl CovariateEncoder {
    /// Fit vocabularies from the training records. Value order is
    /// sorted, so the encoding is deterministic across runs.
    pub fn fit(records: &[ClinicalRecord], cat_labels: &[String], cont_labels: &[String]) -> Self {
        let cat = cat_labels
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let mut values: Vec<String> = records
                    .iter()
                    .filter_map(|r| r.cat_values[col].clone())
                    .collect();
                values.sort();
                values.dedup();
                CovariateVocab { name: name.clone(), values }
            })
            .collect();

        Self { cat, cont: cont_labels.to_vec() }
    }

    /// Width of the encoded vector.
    pub fn encoded_dim(&self) -> usize {
        let cat_dim: usize = self.cat.iter().map(|v| v.values.len() + 1).sum();
        cat_dim + self.cont.len()
    }

    /// Encode one patient's covariates. Missing continuous values
    /// fail here, after the join has decided the patient is retained.
    pub fn encode(&self, record: &ClinicalRecord) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.encoded_dim());

        for (col, vocab) in self.cat.iter().enumerate() {
            let mut onehot = vec![0.0f32; vocab.values.len() + 1];
            onehot[vocab.slot(record.cat_values[col].as_deref())] = 1.0;
            out.extend_from_slice(&onehot);
        }

        for (col, name) in self.cont.iter().enumerate() {
            match record.cont_values[col] {
                Some(v) => out.push(v as f32),
                None => {
                    return Err(PipelineError::Data(format!(
                        "patient '{}': missing required continuous covariate '{name}'",
                        record.patient_id
                    )))
                }
            }
        }

        Ok(out)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, gender: Option<&str>, age: Option<f64>) -> ClinicalRecord {
        ClinicalRecord {
            patient_id:  id.into(),
            target:      Some("x".into()),
            cat_values:  vec![gender.map(str::to_string)],
            cont_values: vec![age],
        }
    }

    fn fitted() -> CovariateEncoder {
        let records = vec![
            record("p1", Some("F"), Some(60.0)),
            record("p2", Some("M"), Some(70.0)),
        ];
        CovariateEncoder::fit(&records, &["GENDER".into()], &["AGE".into()])
    }

    #[test]
    fn test_onehot_with_unknown_slot() {
        let enc = fitted();
        // 2 observed values + 1 unknown slot + 1 continuous
        assert_eq!(enc.encoded_dim(), 4);

        let v = enc.encode(&record("p1", Some("F"), Some(60.0))).unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 60.0]);
    }

    #[test]
    fn test_unseen_category_maps_to_unknown() {
        let enc = fitted();
        let v = enc.encode(&record("p3", Some("X"), Some(50.0))).unwrap();
        assert_eq!(v, vec![0.0, 0.0, 1.0, 50.0]);

        // Missing categorical value also lands in the unknown slot
        let v = enc.encode(&record("p4", None, Some(50.0))).unwrap();
        assert_eq!(v, vec![0.0, 0.0, 1.0, 50.0]);
    }

    #[test]
    fn test_missing_continuous_is_data_error() {
        let enc = fitted();
        let err = enc.encode(&record("p5", Some("F"), None)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("p5") && msg.contains("AGE"));
    }

    #[test]
    fn test_fit_is_deterministic() {
        // Same records in a different order fit the same vocabulary
        let a = vec![record("p1", Some("M"), Some(1.0)), record("p2", Some("F"), Some(1.0))];
        let b = vec![record("p2", Some("F"), Some(1.0)), record("p1", Some("M"), Some(1.0))];
        let ea = CovariateEncoder::fit(&a, &["GENDER".into()], &[]);
        let eb = CovariateEncoder::fit(&b, &["GENDER".into()], &[]);
        assert_eq!(ea, eb);
    }
}
