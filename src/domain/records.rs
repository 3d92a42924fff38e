// ============================================================
// Layer 3 — Tabular Records
// ============================================================
// Plain data structs for the three tables the pipeline touches:
// the clinical table (one row per patient), the slide index
// (one row per slide), and the prediction table the modeling
// stages emit and the statistics engine consumes.

use serde::{Deserialize, Serialize};

/// One row of the clinical table.
///
/// Covariate values are stored positionally, aligned with the
/// caller-supplied column name lists — the joiner owns the names.
#[derive(Debug, Clone)]
pub struct ClinicalRecord {
    /// Unique patient identifier (the join key)
    pub patient_id: String,

    /// Target label; None means missing. Records with a missing
    /// target are dropped before training but kept for deployment.
    pub target: Option<String>,

    /// Categorical covariate values, aligned with the cat label list
    pub cat_values: Vec<Option<String>>,

    /// Continuous covariate values, aligned with the cont label list
    pub cont_values: Vec<Option<f64>>,
}

/// One row of the slide index: slide → owning patient.
/// Every slide belongs to exactly one patient; a patient may own
/// multiple slides.
#[derive(Debug, Clone)]
pub struct SlideIndexEntry {
    pub slide_id:   String,
    pub patient_id: String,
}

/// One patient's predicted class probabilities.
///
/// Created by Trainer / Cross-Validator / Deployer, persisted as a
/// CSV row, and consumed only by the statistics engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub patient_id: String,

    /// Which cross-validation fold produced this prediction;
    /// None for plain train/deploy output.
    pub fold: Option<usize>,

    /// Ground-truth label if known (deploy data may lack one)
    pub true_label: Option<String>,

    /// Argmax category under the artifact's category order
    pub pred_label: String,

    /// Per-category probabilities, ordered by the artifact's
    /// category list; sums to 1 within floating-point tolerance.
    pub probs: Vec<f64>,
}

impl PredictionRecord {
    /// Index of the most probable category.
    pub fn argmax(probs: &[f64]) -> usize {
        let mut best = 0;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }
        best
    }
}
