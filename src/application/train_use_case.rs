// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one supervised training run in order:
//
//   Step 1: Join tables + feature files   (Layer 4 - data)
//   Step 2: Filter to labeled patients    (Layer 4 - data)
//   Step 3: Fit with early stopping       (Layer 5 - ml)
//   Step 4: Save the model artifact       (Layer 6 - infra)
//   Step 5: Write metrics + predictions   (Layer 6 - infra)
//
// The saved artifact carries the fitted schema (category order,
// covariate encoder, feature dim), so a later `deploy` can refuse
// incompatible data before any inference runs.

use anyhow::{Context, Result};
use std::path::Path;

use crate::application::DataConfig;
use crate::data::joiner::fit_join;
use crate::infra::artifact::{ArtifactMeta, ArtifactStore};
use crate::infra::metrics::MetricsLogger;
use crate::infra::predictions::write_predictions;
use crate::ml::deployer::score_samples;
use crate::ml::trainer::{fit, FitConfig, StopSignal};
use crate::ml::ModelingRuntime;

pub struct TrainUseCase {
    data: DataConfig,
    fit:  FitConfig,
}

impl TrainUseCase {
    pub fn new(data: DataConfig, fit: FitConfig) -> Self {
        Self { data, fit }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(&self) -> Result<()> {
        let out = Path::new(&self.data.output_path);

        // ── Step 1: Join clinical table, slide index, features ────────────────
        tracing::info!(
            "joining '{}' + '{}' + '{}'",
            self.data.clini_table,
            self.data.slide_csv,
            self.data.feature_dir,
        );
        let columns = self.data.columns();
        let joined = fit_join(
            &self.data.join_inputs(&columns),
            self.data.categories.as_deref(),
        )
        .context("joining the input dataset failed")?;
        tracing::info!("{}", joined.diagnostics.summary());
        tracing::info!(
            "target '{}' with categories {:?}",
            self.data.target_label,
            joined.categories,
        );

        // ── Step 2: Keep only patients with a usable target ───────────────────
        let labeled = joined.labeled();
        if labeled.is_empty() {
            anyhow::bail!(
                "no patient with a usable '{}' value survived the join",
                self.data.target_label
            );
        }
        if joined.categories.len() < 2 {
            anyhow::bail!(
                "need at least 2 target categories, found {:?}",
                joined.categories
            );
        }
        tracing::info!("{} labeled patients enter training", labeled.len());

        // ── Step 3: Fit one model ─────────────────────────────────────────────
        let runtime = ModelingRuntime::new(self.fit.seed);
        let outcome = fit(
            &runtime,
            &self.fit,
            &labeled,
            joined.feature_dim,
            joined.categories.len(),
            &StopSignal::new(),
        )
        .context("model fitting failed")?;
        tracing::info!(
            "best epoch {} (val_loss {:.6}) after {} epochs, {:?}",
            outcome.best_epoch,
            outcome.best_val_loss,
            outcome.epochs_run,
            outcome.stop_reason,
        );

        // ── Step 4: Save the artifact ─────────────────────────────────────────
        let meta = ArtifactMeta {
            feature_dim: joined.feature_dim,
            categories:  joined.categories.clone(),
            encoder:     joined.encoder.clone(),
            d_model:     self.fit.d_model,
            d_attn:      self.fit.d_attn,
            dropout:     self.fit.dropout,
        };
        ArtifactStore::new(out.join("model"))
            .save(&outcome.model, &meta)
            .context("saving the model artifact failed")?;

        // ── Step 5: Metrics + held-out validation predictions ─────────────────
        MetricsLogger::new(out)?.log_all(&outcome.epoch_metrics)?;

        let predictions = score_samples(
            &outcome.model,
            &outcome.val_samples,
            &joined.categories,
            &runtime.device,
            self.fit.batch_size,
            None,
        )
        .context("scoring the validation slice failed")?;
        write_predictions(&out.join("patient-preds.csv"), &predictions, &joined.categories)?;

        Ok(())
    }
}
