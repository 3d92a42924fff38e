// ============================================================
// Layer 5 — Cross-Validator
// ============================================================
// Patient-grouped stratified k-fold cross-validation:
//
//   for fold i in 0..n_splits:
//     train on folds != i   (the Trainer carves its own
//                            validation slice from that split)
//     score fold i          (full bags, deterministic)
//     tag predictions with fold id i
//
// Aggregate invariants (tested here and end-to-end):
//   - every patient appears in exactly one fold's test predictions
//   - no patient is ever scored by a model trained on it
//
// A failure in any fold aborts the whole run — cross-validation is
// all-or-nothing, never a partial-result silent success. Folds run
// sequentially and results are assembled in fold-index order, so
// the output table is deterministic for a fixed seed.

use crate::data::joiner::PatientSample;
use crate::data::splitter::stratified_kfold;
use crate::domain::error::{PipelineError, Result};
use crate::domain::records::PredictionRecord;
use crate::ml::deployer::score_samples;
use crate::ml::trainer::{fit, FitConfig, FitOutcome, StopSignal};
use crate::ml::ModelingRuntime;

/// One fold's trained model plus its out-of-fold predictions.
#[derive(Debug)]
pub struct FoldOutcome {
    pub fold:        usize,
    pub fit:         FitOutcome,
    pub predictions: Vec<PredictionRecord>,
}

/// Run the full cross-validation. `samples` must all be labeled.
pub fn cross_validate(
    runtime:     &ModelingRuntime,
    cfg:         &FitConfig,
    samples:     &[PatientSample],
    feature_dim: usize,
    categories:  &[String],
    n_splits:    usize,
    stop:        &StopSignal,
) -> Result<Vec<FoldOutcome>> {
    if samples.is_empty() {
        return Err(PipelineError::Config(
            "no usable patients left after joining and filtering".into(),
        ));
    }

    let labels: Vec<usize> = samples
        .iter()
        .map(|s| {
            s.label.ok_or_else(|| {
                PipelineError::Config(format!(
                    "patient '{}' reached cross-validation without a label",
                    s.patient_id
                ))
            })
        })
        .collect::<Result<_>>()?;

    let fold_of = stratified_kfold(&labels, n_splits, cfg.seed)?;
    let mut outcomes = Vec::with_capacity(n_splits);

    for fold in 0..n_splits {
        let train: Vec<PatientSample> = samples
            .iter()
            .zip(&fold_of)
            .filter(|(_, &f)| f != fold)
            .map(|(s, _)| s.clone())
            .collect();
        let test: Vec<PatientSample> = samples
            .iter()
            .zip(&fold_of)
            .filter(|(_, &f)| f == fold)
            .map(|(s, _)| s.clone())
            .collect();

        tracing::info!(
            "fold {fold}/{n_splits}: {} train patients, {} test patients",
            train.len(),
            test.len()
        );

        // Each fold gets its own derived seed so fold models are
        // independent yet the whole run replays under one seed.
        let fold_cfg = FitConfig {
            seed: cfg.seed.wrapping_add(fold as u64),
            ..cfg.clone()
        };

        // Any fold failure propagates and aborts the whole run
        let fit_outcome = fit(
            &runtime_for_fold(runtime, &fold_cfg),
            &fold_cfg,
            &train,
            feature_dim,
            categories.len(),
            stop,
        )?;

        let predictions = score_samples(
            &fit_outcome.model,
            &test,
            categories,
            &runtime.device,
            fold_cfg.batch_size,
            Some(fold),
        )?;

        outcomes.push(FoldOutcome { fold, fit: fit_outcome, predictions });
    }

    Ok(outcomes)
}

/// Reseed the backend per fold so each fold's weight init is
/// reproducible in isolation as well as within the full run.
fn runtime_for_fold(runtime: &ModelingRuntime, fold_cfg: &FitConfig) -> ModelingRuntime {
    ModelingRuntime::new(fold_cfg.seed.wrapping_add(runtime.seed))
}

/// Flatten per-fold predictions in fold-index order.
pub fn collect_predictions(outcomes: &[FoldOutcome]) -> Vec<PredictionRecord> {
    outcomes
        .iter()
        .flat_map(|o| o.predictions.iter().cloned())
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn synthetic_samples(n_per_class: usize) -> Vec<PatientSample> {
        let mut samples = Vec::new();
        for class in 0..2usize {
            for i in 0..n_per_class {
                let centre = if class == 0 { -1.0f32 } else { 1.0 };
                samples.push(PatientSample {
                    patient_id: format!("c{class}_p{i}"),
                    features:   vec![centre, centre * 0.5, centre, centre * 0.5],
                    n_tiles:    2,
                    dim:        2,
                    covariates: vec![],
                    label:      Some(class),
                });
            }
        }
        samples
    }

    fn quick_cfg() -> FitConfig {
        FitConfig {
            batch_size:    4,
            max_epochs:    2,
            lr:            1e-3,
            patience:      2,
            val_fraction:  0.25,
            max_bag_size:  None,
            class_weights: false,
            seed:          42,
            d_model:       8,
            d_attn:        4,
            dropout:       0.0,
        }
    }

    #[test]
    fn test_out_of_fold_predictions_partition_patients() {
        let runtime = ModelingRuntime::new(42);
        let samples = synthetic_samples(6); // 12 patients
        let categories = vec!["neg".to_string(), "pos".to_string()];

        let outcomes = cross_validate(
            &runtime, &quick_cfg(), &samples, 2, &categories, 3, &StopSignal::new(),
        )
        .unwrap();
        let predictions = collect_predictions(&outcomes);

        // Every patient appears in exactly one fold's test predictions
        assert_eq!(predictions.len(), 12);
        let ids: HashSet<&str> = predictions.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids.len(), 12);

        for p in &predictions {
            let fold = p.fold.expect("crossval predictions must carry a fold id");
            assert!(fold < 3);
        }
    }

    #[test]
    fn test_fold_models_never_see_their_test_patients() {
        // The partition itself guarantees no leakage; verify from the
        // fold assignment that train/test never share a patient.
        let samples = synthetic_samples(6);
        let labels: Vec<usize> = samples.iter().map(|s| s.label.unwrap()).collect();
        let fold_of = stratified_kfold(&labels, 3, 42).unwrap();

        for fold in 0..3 {
            let train: HashSet<usize> =
                (0..12).filter(|&i| fold_of[i] != fold).collect();
            let test: HashSet<usize> =
                (0..12).filter(|&i| fold_of[i] == fold).collect();
            assert!(train.is_disjoint(&test));
            assert_eq!(train.len() + test.len(), 12);
        }
    }

    #[test]
    fn test_unlabeled_sample_is_config_error() {
        let runtime = ModelingRuntime::new(42);
        let mut samples = synthetic_samples(6);
        samples[0].label = None;
        let categories = vec!["neg".to_string(), "pos".to_string()];

        let err = cross_validate(
            &runtime, &quick_cfg(), &samples, 2, &categories, 3, &StopSignal::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
