// ============================================================
// Layer 4 — Metadata Joiner
// ============================================================
// Merges the clinical table, the slide index, and the feature
// directory into per-patient modeling samples:
//
//   clinical row ──┐
//   slide index ───┼── inner join on PATIENT ──► PatientBag
//   feature files ─┘                             + label index
//                                                + encoded covariates
//
// Join policy (recover locally, count, keep going):
//   - a slide with no resolvable feature file is dropped with a
//     per-slide warning, provided the patient keeps ≥ 1 slide
//   - a patient with zero resolvable slides is excluded and counted
//     in the diagnostics summary — never a hard failure
//   - a slide claiming two different patients IS a hard failure
//     (every slide belongs to exactly one patient)
//
// Two entry points:
//   fit_join         — training: fits target categories and the
//                      covariate encoder from the data it retains
//   join_with_schema — deployment: reuses a ModelArtifact's
//                      categories and fitted encoder verbatim
//
// The joiner is a pure transform: no side effects beyond warnings.

use std::collections::HashMap;
use std::path::Path;

use crate::data::covariates::CovariateEncoder;
use crate::data::features::{load_feature_bag, resolve_feature_path};
use crate::data::tables::{load_clinical, load_slide_index, ClinicalColumns};
use crate::domain::bag::PatientBag;
use crate::domain::error::{PipelineError, Result};
use crate::domain::records::{ClinicalRecord, SlideIndexEntry};

/// How many affected identifiers to keep as a sample in diagnostics.
const DIAGNOSTIC_SAMPLE: usize = 5;

/// The file inputs of one join.
#[derive(Debug, Clone)]
pub struct JoinInputs<'a> {
    pub clini_table: &'a Path,
    pub slide_csv:   &'a Path,
    pub feature_dir: &'a Path,
    pub columns:     ClinicalColumns,
}

/// One patient, ready for batching: flattened bag + encoded
/// covariates + the label's index into the category order.
#[derive(Debug, Clone)]
pub struct PatientSample {
    pub patient_id: String,

    /// Row-major tile features, length = n_tiles * dim
    pub features: Vec<f32>,
    pub n_tiles:  usize,
    pub dim:      usize,

    /// Encoded covariate vector (may be empty)
    pub covariates: Vec<f32>,

    /// Index into the category order; None = target missing, which
    /// is allowed at deployment and filtered out before training.
    pub label: Option<usize>,
}

/// Counted per-row drops, surfaced to the caller after the join.
#[derive(Debug, Clone, Default)]
pub struct JoinDiagnostics {
    pub slides_dropped:   usize,
    pub patients_dropped: usize,
    pub dropped_slides:   Vec<String>,
    pub dropped_patients: Vec<String>,
}

impl JoinDiagnostics {
    fn drop_slide(&mut self, slide_id: &str, reason: &str) {
        tracing::warn!("dropping slide '{slide_id}': {reason}");
        self.slides_dropped += 1;
        if self.dropped_slides.len() < DIAGNOSTIC_SAMPLE {
            self.dropped_slides.push(slide_id.to_string());
        }
    }

    fn drop_patient(&mut self, patient_id: &str, reason: &str) {
        tracing::warn!("excluding patient '{patient_id}': {reason}");
        self.patients_dropped += 1;
        if self.dropped_patients.len() < DIAGNOSTIC_SAMPLE {
            self.dropped_patients.push(patient_id.to_string());
        }
    }

    /// One-line summary for the end of a join.
    pub fn summary(&self) -> String {
        format!(
            "dropped {} slide(s) (e.g. {:?}) and excluded {} patient(s) (e.g. {:?})",
            self.slides_dropped, self.dropped_slides,
            self.patients_dropped, self.dropped_patients,
        )
    }
}

/// The join result: samples plus everything needed to interpret them.
#[derive(Debug, Clone)]
pub struct JoinedDataset {
    pub samples: Vec<PatientSample>,

    /// Fixed tile-feature dimensionality across the dataset
    pub feature_dim: usize,

    /// Ordered target categories; defines the class-index mapping
    pub categories: Vec<String>,

    /// Fitted (or artifact-supplied) covariate encoder
    pub encoder: CovariateEncoder,

    pub diagnostics: JoinDiagnostics,
}

impl JoinedDataset {
    /// Samples with a known target, for training/cross-validation.
    pub fn labeled(&self) -> Vec<PatientSample> {
        self.samples.iter().filter(|s| s.label.is_some()).cloned().collect()
    }
}

/// Training-time join: fit the target category order and the
/// covariate vocabulary from the retained patients.
///
/// `explicit_categories`, when given, fixes the category order and
/// any observed target value outside it is a DataError.
pub fn fit_join(
    inputs:              &JoinInputs,
    explicit_categories: Option<&[String]>,
) -> Result<JoinedDataset> {
    let (retained, diagnostics, feature_dim) = join_bags(inputs)?;

    // ── Target category order ─────────────────────────────────────────────────
    // Sorted observed values unless the caller pinned them explicitly.
    let categories: Vec<String> = match explicit_categories {
        Some(c) => {
            for (record, _) in &retained {
                if let Some(t) = &record.target {
                    if !c.contains(t) {
                        return Err(PipelineError::Data(format!(
                            "patient '{}': target '{t}' is not in the supplied categories {c:?}",
                            record.patient_id
                        )));
                    }
                }
            }
            c.to_vec()
        }
        None => {
            let mut observed: Vec<String> = retained
                .iter()
                .filter_map(|(r, _)| r.target.clone())
                .collect();
            observed.sort();
            observed.dedup();
            observed
        }
    };

    let clinical: Vec<ClinicalRecord> = retained.iter().map(|(r, _)| r.clone()).collect();
    let encoder = CovariateEncoder::fit(
        &clinical,
        &inputs.columns.cat_labels,
        &inputs.columns.cont_labels,
    );

    assemble(retained, diagnostics, feature_dim, categories, encoder)
}

/// Deployment-time join: encode with the artifact's category order
/// and fitted encoder. Target values outside the artifact's
/// categories become unlabeled rather than failing — deployment
/// data may legitimately lack usable ground truth.
pub fn join_with_schema(
    inputs:     &JoinInputs,
    categories: &[String],
    encoder:    &CovariateEncoder,
) -> Result<JoinedDataset> {
    let (retained, diagnostics, feature_dim) = join_bags(inputs)?;
    assemble(retained, diagnostics, feature_dim, categories.to_vec(), encoder.clone())
}

// ─── Join core ────────────────────────────────────────────────────────────────
// Everything shared between fit and deploy joins: load both tables,
// group slides per patient, read feature files, build PatientBags.
fn join_bags(
    inputs: &JoinInputs,
) -> Result<(Vec<(ClinicalRecord, PatientBag)>, JoinDiagnostics, usize)> {
    let clinical = load_clinical(inputs.clini_table, &inputs.columns)?;
    let slides   = load_slide_index(inputs.slide_csv)?;

    // slide id → patient id must be a function: a slide claiming two
    // patients breaks the ownership invariant and is fatal.
    let mut owner: HashMap<&str, &str> = HashMap::new();
    let mut per_patient: HashMap<&str, Vec<&SlideIndexEntry>> = HashMap::new();
    for entry in &slides {
        if let Some(prev) = owner.insert(&entry.slide_id, &entry.patient_id) {
            if prev != entry.patient_id {
                return Err(PipelineError::Data(format!(
                    "slide '{}' is indexed under both patient '{prev}' and patient '{}'",
                    entry.slide_id, entry.patient_id
                )));
            }
            continue; // exact duplicate row
        }
        per_patient.entry(&entry.patient_id).or_default().push(entry);
    }

    let mut diagnostics = JoinDiagnostics::default();
    let mut feature_dim = 0usize;
    let mut retained    = Vec::new();

    // Clinical-table order drives the output order → deterministic.
    for record in clinical {
        let Some(entries) = per_patient.get(record.patient_id.as_str()) else {
            diagnostics.drop_patient(&record.patient_id, "no slides in the slide index");
            continue;
        };

        let mut bag = PatientBag::new(&record.patient_id, feature_dim);
        for entry in entries {
            let Some(path) = resolve_feature_path(inputs.feature_dir, &entry.slide_id) else {
                diagnostics.drop_slide(&entry.slide_id, "no feature file in the feature directory");
                continue;
            };
            let slide_bag = load_feature_bag(&path, &entry.slide_id)?;
            if slide_bag.is_empty() {
                diagnostics.drop_slide(&entry.slide_id, "feature file contains zero tiles");
                continue;
            }
            bag.push_slide(&slide_bag)?;
        }

        if bag.is_empty() {
            diagnostics.drop_patient(&record.patient_id, "zero resolvable slides");
            continue;
        }

        // Dimensionality is fixed across the whole dataset
        if feature_dim == 0 {
            feature_dim = bag.dim;
        } else if bag.dim != feature_dim {
            return Err(PipelineError::Data(format!(
                "patient '{}': feature dimensionality {} differs from the dataset's {}",
                record.patient_id, bag.dim, feature_dim
            )));
        }

        retained.push((record, bag));
    }

    if diagnostics.slides_dropped + diagnostics.patients_dropped > 0 {
        tracing::warn!("join diagnostics: {}", diagnostics.summary());
    }
    tracing::info!(
        "join retained {} patient(s), feature dimensionality {}",
        retained.len(),
        feature_dim
    );

    Ok((retained, diagnostics, feature_dim))
}

fn assemble(
    retained:    Vec<(ClinicalRecord, PatientBag)>,
    diagnostics: JoinDiagnostics,
    feature_dim: usize,
    categories:  Vec<String>,
    encoder:     CovariateEncoder,
) -> Result<JoinedDataset> {
    let mut samples = Vec::with_capacity(retained.len());

    for (record, bag) in retained {
        let label = match &record.target {
            Some(t) => match categories.iter().position(|c| c == t) {
                Some(i) => Some(i),
                None => {
                    tracing::warn!(
                        "patient '{}': target '{t}' not among model categories, treating as unlabeled",
                        record.patient_id
                    );
                    None
                }
            },
            None => None,
        };

        let covariates = encoder.encode(&record)?;

        samples.push(PatientSample {
            patient_id: record.patient_id,
            features:   bag.data,
            n_tiles:    bag.n_tiles,
            dim:        bag.dim,
            covariates,
            label,
        });
    }

    Ok(JoinedDataset { samples, feature_dim, categories, encoder, diagnostics })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Lay out a small on-disk fixture: clinical CSV, slide CSV, and
    /// feature files for the slides in `with_features`.
    fn fixture(
        dir:           &Path,
        clinical:      &str,
        slide_index:   &str,
        with_features: &[&str],
    ) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
        let clini = dir.join("clini.csv");
        let slide = dir.join("slide.csv");
        let feats = dir.join("features");
        fs::create_dir_all(&feats).unwrap();
        fs::write(&clini, clinical).unwrap();
        fs::write(&slide, slide_index).unwrap();
        for s in with_features {
            fs::write(
                feats.join(format!("{s}.json")),
                r#"{"features": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]}"#,
            )
            .unwrap();
        }
        (clini, slide, feats)
    }

    fn columns() -> ClinicalColumns {
        ClinicalColumns {
            target:      "LABEL".into(),
            cat_labels:  vec![],
            cont_labels: vec![],
        }
    }

    #[test]
    fn test_join_concatenates_patient_slides() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s, f) = fixture(
            tmp.path(),
            "PATIENT,LABEL\np1,pos\np2,neg\n",
            "FILENAME,PATIENT\ns1,p1\ns2,p1\ns3,p2\n",
            &["s1", "s2", "s3"],
        );
        let inputs = JoinInputs { clini_table: &c, slide_csv: &s, feature_dir: &f, columns: columns() };
        let joined = fit_join(&inputs, None).unwrap();

        assert_eq!(joined.feature_dim, 3);
        assert_eq!(joined.samples.len(), 2);
        // p1 owns two slides with two tiles each
        assert_eq!(joined.samples[0].n_tiles, 4);
        assert_eq!(joined.samples[1].n_tiles, 2);
        // Sorted observed categories
        assert_eq!(joined.categories, vec!["neg".to_string(), "pos".to_string()]);
        assert_eq!(joined.samples[0].label, Some(1));
    }

    #[test]
    fn test_missing_feature_file_drops_slide_not_patient() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s, f) = fixture(
            tmp.path(),
            "PATIENT,LABEL\np1,pos\n",
            "FILENAME,PATIENT\ns1,p1\ns2,p1\n",
            &["s1"], // s2 has no feature file
        );
        let inputs = JoinInputs { clini_table: &c, slide_csv: &s, feature_dir: &f, columns: columns() };
        let joined = fit_join(&inputs, None).unwrap();

        assert_eq!(joined.samples.len(), 1);
        assert_eq!(joined.samples[0].n_tiles, 2);
        assert_eq!(joined.diagnostics.slides_dropped, 1);
        assert_eq!(joined.diagnostics.dropped_slides, vec!["s2".to_string()]);
    }

    #[test]
    fn test_patient_with_no_resolvable_slides_is_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s, f) = fixture(
            tmp.path(),
            "PATIENT,LABEL\np1,pos\np2,neg\n",
            "FILENAME,PATIENT\ns1,p1\ns2,p2\n",
            &["s1"], // p2's only slide has no features
        );
        let inputs = JoinInputs { clini_table: &c, slide_csv: &s, feature_dir: &f, columns: columns() };
        let joined = fit_join(&inputs, None).unwrap();

        assert_eq!(joined.samples.len(), 1);
        assert_eq!(joined.diagnostics.patients_dropped, 1);
        assert_eq!(joined.diagnostics.dropped_patients, vec!["p2".to_string()]);
    }

    #[test]
    fn test_explicit_categories_validate_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s, f) = fixture(
            tmp.path(),
            "PATIENT,LABEL\np1,weird\n",
            "FILENAME,PATIENT\ns1,p1\n",
            &["s1"],
        );
        let inputs = JoinInputs { clini_table: &c, slide_csv: &s, feature_dir: &f, columns: columns() };
        let err = fit_join(&inputs, Some(&["neg".into(), "pos".into()])).unwrap_err();
        assert!(err.to_string().contains("weird"));
    }

    #[test]
    fn test_slide_owned_by_two_patients_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s, f) = fixture(
            tmp.path(),
            "PATIENT,LABEL\np1,pos\np2,neg\n",
            "FILENAME,PATIENT\ns1,p1\ns1,p2\n",
            &["s1"],
        );
        let inputs = JoinInputs { clini_table: &c, slide_csv: &s, feature_dir: &f, columns: columns() };
        assert!(fit_join(&inputs, None).is_err());
    }

    #[test]
    fn test_missing_target_is_retained_unlabeled() {
        let tmp = tempfile::tempdir().unwrap();
        let (c, s, f) = fixture(
            tmp.path(),
            "PATIENT,LABEL\np1,pos\np2,\n",
            "FILENAME,PATIENT\ns1,p1\ns2,p2\n",
            &["s1", "s2"],
        );
        let inputs = JoinInputs { clini_table: &c, slide_csv: &s, feature_dir: &f, columns: columns() };
        let joined = fit_join(&inputs, None).unwrap();

        assert_eq!(joined.samples.len(), 2);
        assert_eq!(joined.samples[1].label, None);
        // labeled() filters the unlabeled patient out for training
        assert_eq!(joined.labeled().len(), 1);
    }
}
