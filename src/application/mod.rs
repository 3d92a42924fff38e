// ============================================================
// Layer 2 — Application Layer (Use Cases)
// ============================================================
// One use case per subcommand. Each owns its configuration,
// orchestrates the lower layers in order, and writes its outputs
// under the configured output directory:
//
//   train_use_case.rs    — join → fit one model → save artifact,
//                          metrics.csv, validation predictions
//   crossval_use_case.rs — join → k-fold fit/score → per-fold
//                          artifacts + one out-of-fold table
//   deploy_use_case.rs   — load artifact → join with its schema →
//                          score every patient
//   roc_use_case.rs      — read a prediction table → ROC curves,
//                          AUCs, bootstrap confidence intervals
//
// Use cases convert domain PipelineErrors into anyhow errors with
// added context; the CLI layer above only prints and exits.

use serde::{Deserialize, Serialize};

/// Crossval use case
pub mod crossval_use_case;

/// Deploy use case
pub mod deploy_use_case;

/// ROC statistics use case
pub mod roc_use_case;

/// Train use case
pub mod train_use_case;

// ─── Shared Data Configuration ───────────────────────────────────────────────
// Where the three inputs live and which clinical columns matter.
// Serialisable so a run's exact inputs can be recorded alongside
// its outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Clinical table CSV (one row per patient)
    pub clini_table: String,

    /// Slide index CSV mapping FILENAME → PATIENT
    pub slide_csv: String,

    /// Directory of per-slide tile-feature files
    pub feature_dir: String,

    /// Directory for all run outputs
    pub output_path: String,

    /// Clinical column holding the target
    pub target_label: String,

    /// Categorical covariate columns
    pub cat_labels: Vec<String>,

    /// Continuous covariate columns
    pub cont_labels: Vec<String>,

    /// Explicit target category order; None = sorted observed values
    pub categories: Option<Vec<String>>,
}

impl DataConfig {
    pub(crate) fn columns(&self) -> crate::data::tables::ClinicalColumns {
        crate::data::tables::ClinicalColumns {
            target:      self.target_label.clone(),
            cat_labels:  self.cat_labels.clone(),
            cont_labels: self.cont_labels.clone(),
        }
    }

    pub(crate) fn join_inputs(
        &self,
        columns: &crate::data::tables::ClinicalColumns,
    ) -> crate::data::joiner::JoinInputs<'_> {
        crate::data::joiner::JoinInputs {
            clini_table: std::path::Path::new(&self.clini_table),
            slide_csv:   std::path::Path::new(&self.slide_csv),
            feature_dir: std::path::Path::new(&self.feature_dir),
            columns:     columns.clone(),
        }
    }
}
