// ============================================================
// Layer 2 — DeployUseCase
// ============================================================
// Scores a new cohort with a previously trained artifact:
//
//   Step 1: Load artifact + schema        (Layer 6 - infra)
//   Step 2: Join new data with that schema (Layer 4 - data)
//   Step 3: Validate schema, then score   (Layer 5 - ml)
//   Step 4: Write the prediction table    (Layer 6 - infra)
//
// The covariate columns to read always come from the artifact's
// record, so deployment cannot silently encode the new cohort
// differently from training. Columns or categories given on the
// command line are checked against that record first; a mismatch is
// a schema error naming the field. Patients without a usable target
// are still scored; their true_label cell stays empty.

use anyhow::{Context, Result};
use std::path::Path;

use crate::application::DataConfig;
use crate::data::joiner::join_with_schema;
use crate::data::tables::ClinicalColumns;
use crate::domain::error::PipelineError;
use crate::infra::artifact::{ArtifactMeta, ArtifactStore};
use crate::infra::predictions::write_predictions;
use crate::ml::deployer::deploy;
use crate::ml::ModelingRuntime;

pub struct DeployUseCase {
    data:       DataConfig,
    model_path: String,
    batch_size: usize,
    seed:       u64,
}

impl DeployUseCase {
    pub fn new(data: DataConfig, model_path: String, batch_size: usize, seed: u64) -> Self {
        Self { data, model_path, batch_size, seed }
    }

    /// Execute the full deployment end to end.
    pub fn execute(&self) -> Result<()> {
        let out = Path::new(&self.data.output_path);
        let runtime = ModelingRuntime::new(self.seed);

        // ── Step 1: Load the trained artifact ─────────────────────────────────
        let store = ArtifactStore::new(&self.model_path);
        let (model, meta) = store
            .load(&runtime.device)
            .with_context(|| format!("loading the model artifact from '{}'", self.model_path))?;
        tracing::info!(
            "loaded artifact: {} categories, feature dim {}",
            meta.categories.len(),
            meta.feature_dim,
        );
        self.check_requested_schema(&meta)?;

        // ── Step 2: Join the new cohort under the artifact's schema ───────────
        let columns = ClinicalColumns {
            target:      self.data.target_label.clone(),
            cat_labels:  meta.encoder.cat.iter().map(|v| v.name.clone()).collect(),
            cont_labels: meta.encoder.cont.clone(),
        };
        let joined = join_with_schema(
            &self.data.join_inputs(&columns),
            &meta.categories,
            &meta.encoder,
        )
        .context("joining the deployment dataset failed")?;
        tracing::info!("{}", joined.diagnostics.summary());

        // ── Step 3: Validate and score ────────────────────────────────────────
        let predictions = deploy(&runtime, &model, &meta, &joined, self.batch_size)
            .context("scoring the deployment dataset failed")?;

        // ── Step 4: Write the prediction table ────────────────────────────────
        write_predictions(&out.join("patient-preds.csv"), &predictions, &meta.categories)?;

        Ok(())
    }

    /// Columns or categories requested on the command line must
    /// match what the artifact was fitted on; omitted lists defer to
    /// the artifact.
    fn check_requested_schema(&self, meta: &ArtifactMeta) -> Result<()> {
        let mismatch = |field: &str, expected: &[String], found: &[String]| {
            PipelineError::Schema {
                field:    field.into(),
                expected: format!("{expected:?}"),
                found:    format!("{found:?}"),
            }
        };

        let artifact_cats: Vec<String> =
            meta.encoder.cat.iter().map(|v| v.name.clone()).collect();
        if !self.data.cat_labels.is_empty() && self.data.cat_labels != artifact_cats {
            return Err(mismatch("cat_labels", &artifact_cats, &self.data.cat_labels).into());
        }
        if !self.data.cont_labels.is_empty() && self.data.cont_labels != meta.encoder.cont {
            return Err(mismatch("cont_labels", &meta.encoder.cont, &self.data.cont_labels).into());
        }
        if let Some(requested) = &self.data.categories {
            if *requested != meta.categories {
                return Err(mismatch("categories", &meta.categories, requested).into());
            }
        }
        Ok(())
    }
}
