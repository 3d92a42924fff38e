// ============================================================
// Layer 2 — CrossvalUseCase
// ============================================================
// Patient-grouped stratified k-fold cross-validation:
//
//   Step 1: Join tables + feature files   (Layer 4 - data)
//   Step 2: Filter to labeled patients    (Layer 4 - data)
//   Step 3: k-fold fit + out-of-fold score (Layer 5 - ml)
//   Step 4: Per-fold artifacts + metrics  (Layer 6 - infra)
//   Step 5: One unified prediction table  (Layer 6 - infra)
//
// Output layout under the run directory:
//
//   fold-0/model/…      fold-0/metrics.csv
//   fold-1/model/…      fold-1/metrics.csv
//   ...
//   patient-preds.csv   ← every patient once, tagged with its fold

use anyhow::{Context, Result};
use std::path::Path;

use crate::application::DataConfig;
use crate::data::joiner::fit_join;
use crate::infra::artifact::{ArtifactMeta, ArtifactStore};
use crate::infra::metrics::MetricsLogger;
use crate::infra::predictions::write_predictions;
use crate::ml::crossval::{collect_predictions, cross_validate};
use crate::ml::trainer::{FitConfig, StopSignal};
use crate::ml::ModelingRuntime;

pub struct CrossvalUseCase {
    data:     DataConfig,
    fit:      FitConfig,
    n_splits: usize,
}

impl CrossvalUseCase {
    pub fn new(data: DataConfig, fit: FitConfig, n_splits: usize) -> Self {
        Self { data, fit, n_splits }
    }

    /// Execute the full cross-validation end to end.
    pub fn execute(&self) -> Result<()> {
        let out = Path::new(&self.data.output_path);

        // ── Step 1 + 2: Join, then keep labeled patients ──────────────────────
        let columns = self.data.columns();
        let joined = fit_join(
            &self.data.join_inputs(&columns),
            self.data.categories.as_deref(),
        )
        .context("joining the input dataset failed")?;
        tracing::info!("{}", joined.diagnostics.summary());

        let labeled = joined.labeled();
        if labeled.is_empty() {
            anyhow::bail!(
                "no patient with a usable '{}' value survived the join",
                self.data.target_label
            );
        }
        tracing::info!(
            "{} labeled patients, {} folds, categories {:?}",
            labeled.len(),
            self.n_splits,
            joined.categories,
        );

        // ── Step 3: Fit and score every fold ──────────────────────────────────
        let runtime = ModelingRuntime::new(self.fit.seed);
        let outcomes = cross_validate(
            &runtime,
            &self.fit,
            &labeled,
            joined.feature_dim,
            &joined.categories,
            self.n_splits,
            &StopSignal::new(),
        )
        .context("cross-validation failed")?;

        // ── Step 4: Persist each fold's model and learning curve ──────────────
        for outcome in &outcomes {
            let fold_dir = out.join(format!("fold-{}", outcome.fold));
            let meta = ArtifactMeta {
                feature_dim: joined.feature_dim,
                categories:  joined.categories.clone(),
                encoder:     joined.encoder.clone(),
                d_model:     self.fit.d_model,
                d_attn:      self.fit.d_attn,
                dropout:     self.fit.dropout,
            };
            ArtifactStore::new(fold_dir.join("model"))
                .save(&outcome.fit.model, &meta)
                .with_context(|| format!("saving the fold {} artifact failed", outcome.fold))?;
            MetricsLogger::new(&fold_dir)?.log_all(&outcome.fit.epoch_metrics)?;

            tracing::info!(
                "fold {}: best epoch {} (val_loss {:.6})",
                outcome.fold,
                outcome.fit.best_epoch,
                outcome.fit.best_val_loss,
            );
        }

        // ── Step 5: Unified out-of-fold prediction table ──────────────────────
        let predictions = collect_predictions(&outcomes);
        write_predictions(&out.join("patient-preds.csv"), &predictions, &joined.categories)?;

        Ok(())
    }
}
