// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fits one attention-MIL model to one training split:
//
//   Init → epoch loop → {EarlyStopped | MaxEpochsReached
//                        | Interrupted} → finalize
//
// Each epoch: shuffled mini-batches (the shuffle is reseeded from
// run seed + epoch, so a fixed seed reproduces the exact batch
// order), forward/backward/Adam step per batch, then evaluation on
// a patient-grouped validation slice carved from the training
// split — never overlapping any cross-validation test fold.
//
// Early stopping tracks validation loss; after `patience` epochs
// without improvement the loop halts and the snapshot from the
// BEST epoch — kept entirely in memory — is finalized, so an
// overfit final epoch is never the artifact that gets deployed.
//
// A non-finite training loss aborts the run with a NumericError
// instead of silently continuing on garbage numbers. An external
// StopSignal is checked once per epoch boundary and finalizes with
// the best snapshot, same as early stopping.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::data::batcher::BagBatcher;
use crate::data::dataset::BagDataset;
use crate::data::joiner::PatientSample;
use crate::data::splitter::stratified_holdout;
use crate::domain::error::{PipelineError, Result};
use crate::ml::model::{class_weights, AttentionMilConfig, AttentionMilModel};
use crate::ml::{InferBackend, ModelingRuntime, TrainBackend};

/// All knobs of one fit. The validation fraction, bag cap and class
/// weighting are caller-supplied configuration, never inferred.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub batch_size: usize,
    pub max_epochs: usize,
    pub lr:         f64,
    pub patience:   usize,

    /// Fraction of training patients held out for early stopping
    pub val_fraction: f64,

    /// Cap on tiles per bag during training; None = full bags
    pub max_bag_size: Option<usize>,

    /// Weight the loss by inverse training-label frequency
    pub class_weights: bool,

    pub seed: u64,

    // Architecture
    pub d_model: usize,
    pub d_attn:  usize,
    pub dropout: f64,
}

/// Why the epoch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EarlyStopped,
    MaxEpochsReached,
    Interrupted,
}

/// Cooperative external stop flag, checked once per epoch boundary
/// so a consistent best-epoch artifact is still produced.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One epoch's losses, returned for the metrics log.
#[derive(Debug, Clone)]
pub struct EpochMetrics {
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
}

/// The result of one fit: the best-epoch model (inference backend)
/// plus bookkeeping for logs and the artifact.
#[derive(Debug)]
pub struct FitOutcome {
    pub model:         AttentionMilModel<InferBackend>,
    pub best_epoch:    usize,
    pub best_val_loss: f64,
    pub epochs_run:    usize,
    pub stop_reason:   StopReason,
    pub epoch_metrics: Vec<EpochMetrics>,

    /// Patients that formed the validation slice of this fit
    pub val_samples: Vec<PatientSample>,
}

/// Fit one model to `samples` (all of which must carry a label).
pub fn fit(
    runtime:     &ModelingRuntime,
    cfg:         &FitConfig,
    samples:     &[PatientSample],
    feature_dim: usize,
    n_classes:   usize,
    stop:        &StopSignal,
) -> Result<FitOutcome> {
    if samples.is_empty() {
        return Err(PipelineError::Config(
            "no usable patients left after joining and filtering".into(),
        ));
    }
    if n_classes < 2 {
        return Err(PipelineError::Config(format!(
            "need at least 2 target categories, got {n_classes}"
        )));
    }

    // ── Carve the validation slice (patient-grouped, stratified) ──────────────
    let labels: Vec<usize> = samples
        .iter()
        .map(|s| {
            s.label.ok_or_else(|| {
                PipelineError::Config(format!(
                    "patient '{}' reached the trainer without a label",
                    s.patient_id
                ))
            })
        })
        .collect::<Result<_>>()?;

    let (train_idx, val_idx) = stratified_holdout(&labels, cfg.val_fraction, cfg.seed)?;
    if val_idx.is_empty() {
        return Err(PipelineError::Config(format!(
            "val_fraction {} leaves no validation patients (have {})",
            cfg.val_fraction,
            samples.len()
        )));
    }

    let train_samples: Vec<PatientSample> = train_idx.iter().map(|&i| samples[i].clone()).collect();
    let val_samples:   Vec<PatientSample> = val_idx.iter().map(|&i| samples[i].clone()).collect();
    tracing::info!(
        "fitting on {} patients, validating on {}",
        train_samples.len(),
        val_samples.len()
    );

    // ── Build model ───────────────────────────────────────────────────────────
    let covariate_dim = samples[0].covariates.len();
    let model_cfg = AttentionMilConfig::new(
        feature_dim, n_classes, covariate_dim,
        cfg.d_model, cfg.d_attn, cfg.dropout,
    );
    let mut model: AttentionMilModel<TrainBackend> = model_cfg.init(&runtime.device);

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    // Class-balancing weights come from the TRAIN labels only
    let weights = cfg.class_weights.then(|| {
        let train_labels: Vec<usize> = train_idx.iter().map(|&i| labels[i]).collect();
        let w = class_weights(&train_labels, n_classes);
        tracing::debug!("class weights: {w:?}");
        w
    });

    // ── Validation loader (inference backend, full bags, no shuffle) ──────────
    let val_batcher = BagBatcher::<InferBackend>::new(runtime.device.clone());
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(BagDataset::new(val_samples.clone()));

    let mut best_model: AttentionMilModel<TrainBackend> = model.clone();
    let mut best_epoch    = 0usize;
    let mut best_val_loss = f64::INFINITY;
    let mut since_best    = 0usize;
    let mut epoch_metrics = Vec::new();
    let mut stop_reason   = StopReason::MaxEpochsReached;
    let mut epochs_run    = 0usize;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.max_epochs {
        // Shuffle order is reseeded deterministically per epoch
        let epoch_seed    = cfg.seed.wrapping_add(epoch as u64);
        let train_batcher = BagBatcher::<TrainBackend>::with_cap(
            runtime.device.clone(),
            cfg.max_bag_size,
            epoch_seed,
        );
        let train_loader = DataLoaderBuilder::new(train_batcher)
            .batch_size(cfg.batch_size)
            .shuffle(epoch_seed)
            .num_workers(1)
            .build(BagDataset::new(train_samples.clone()));

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let loss = model.forward_loss(batch, weights.as_deref());

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            if !loss_val.is_finite() {
                return Err(PipelineError::Numeric(format!(
                    "non-finite training loss ({loss_val}) in epoch {epoch}"
                )));
            }
            train_loss_sum += loss_val;
            train_batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        let avg_train_loss = train_loss_sum / train_batches.max(1) as f64;

        // ── Validation phase (dropout disabled, no autodiff) ──────────────────
        let model_valid = model.valid();
        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;

        for batch in val_loader.iter() {
            let loss: f64 = model_valid
                .forward_loss(batch, None)
                .into_scalar()
                .elem::<f64>();
            // A NaN here would never beat best_val_loss and the run
            // would quietly stop on the initial weights; abort instead.
            if !loss.is_finite() {
                return Err(PipelineError::Numeric(format!(
                    "non-finite validation loss ({loss}) in epoch {epoch}"
                )));
            }
            val_loss_sum += loss;
            val_batches  += 1;
        }
        let avg_val_loss = val_loss_sum / val_batches.max(1) as f64;

        tracing::info!(
            "epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4}",
            epoch, cfg.max_epochs, avg_train_loss, avg_val_loss,
        );
        epoch_metrics.push(EpochMetrics {
            epoch,
            train_loss: avg_train_loss,
            val_loss:   avg_val_loss,
        });
        epochs_run = epoch;

        // ── Early stopping on the monitored validation loss ───────────────────
        if avg_val_loss < best_val_loss {
            best_val_loss = avg_val_loss;
            best_epoch    = epoch;
            best_model    = model.clone();
            since_best    = 0;
        } else {
            since_best += 1;
            if since_best >= cfg.patience {
                tracing::info!(
                    "early stopping: no improvement for {} epochs (best epoch {})",
                    cfg.patience, best_epoch,
                );
                stop_reason = StopReason::EarlyStopped;
                break;
            }
        }

        // External stop: finalize with the best snapshot instead of
        // an abrupt mid-epoch kill.
        if stop.is_triggered() {
            tracing::warn!("stop signal received, finalizing at best epoch {best_epoch}");
            stop_reason = StopReason::Interrupted;
            break;
        }
    }

    Ok(FitOutcome {
        model: best_model.valid(),
        best_epoch,
        best_val_loss,
        epochs_run,
        stop_reason,
        epoch_metrics,
        val_samples,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::deployer::score_samples;

    /// Two well-separated classes: class 0 near −1, class 1 near +1.
    fn synthetic_samples(n_per_class: usize) -> Vec<PatientSample> {
        let mut samples = Vec::new();
        for class in 0..2usize {
            for i in 0..n_per_class {
                let centre = if class == 0 { -1.0 } else { 1.0 };
                let jitter = (i as f32) * 0.01;
                samples.push(PatientSample {
                    patient_id: format!("c{class}_p{i}"),
                    features:   vec![
                        centre + jitter, centre - jitter,
                        centre, centre + 2.0 * jitter,
                    ],
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
            max_epochs:    3,
            lr:            1e-3,
            patience:      3,
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
    fn test_fit_runs_and_tracks_best_epoch() {
        let runtime = ModelingRuntime::new(42);
        let samples = synthetic_samples(8);
        let out = fit(&runtime, &quick_cfg(), &samples, 2, 2, &StopSignal::new()).unwrap();

        assert!(out.epochs_run >= 1 && out.epochs_run <= 3);
        assert!(out.best_epoch >= 1 && out.best_epoch <= out.epochs_run);
        assert!(out.best_val_loss.is_finite());
        assert_eq!(out.epoch_metrics.len(), out.epochs_run);
        // 4 of 16 patients held out for validation
        assert_eq!(out.val_samples.len(), 4);
    }

    #[test]
    fn test_empty_dataset_is_config_error() {
        let runtime = ModelingRuntime::new(42);
        let err = fit(&runtime, &quick_cfg(), &[], 2, 2, &StopSignal::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_non_finite_loss_is_numeric_error() {
        let runtime = ModelingRuntime::new(42);
        let mut samples = synthetic_samples(8);
        samples[0].features[0] = f32::NAN;

        let err = fit(&runtime, &quick_cfg(), &samples, 2, 2, &StopSignal::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Numeric(_)));
    }

    #[test]
    fn test_non_finite_validation_loss_is_numeric_error() {
        let runtime = ModelingRuntime::new(42);
        let cfg = quick_cfg();
        let mut samples = synthetic_samples(8);

        // Poison a patient that lands in the validation slice, so the
        // training loss stays finite and only validation goes NaN.
        let labels: Vec<usize> = samples.iter().map(|s| s.label.unwrap()).collect();
        let (_, val_idx) = stratified_holdout(&labels, cfg.val_fraction, cfg.seed).unwrap();
        samples[val_idx[0]].features[0] = f32::NAN;

        let err = fit(&runtime, &cfg, &samples, 2, 2, &StopSignal::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Numeric(_)));
    }

    #[test]
    fn test_stop_signal_finalizes_with_best_snapshot() {
        let runtime = ModelingRuntime::new(42);
        let samples = synthetic_samples(8);
        let stop = StopSignal::new();
        stop.trigger();

        // Triggered before the run: the loop ends after epoch 1 with
        // a consistent best-epoch model.
        let out = fit(&runtime, &quick_cfg(), &samples, 2, 2, &stop).unwrap();
        assert_eq!(out.epochs_run, 1);
        assert_eq!(out.stop_reason, StopReason::Interrupted);
    }

    #[test]
    fn test_fixed_seed_reproduces_predictions() {
        let samples = synthetic_samples(8);
        let categories = vec!["neg".to_string(), "pos".to_string()];

        let score = || {
            // A fresh runtime reseeds the backend, so weight init and
            // batching replay exactly.
            let runtime = ModelingRuntime::new(7);
            let out = fit(&runtime, &quick_cfg(), &samples, 2, 2, &StopSignal::new()).unwrap();
            score_samples(&out.model, &samples, &categories, &runtime.device, 4, None).unwrap()
        };

        let first  = score();
        let second = score();
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.patient_id, b.patient_id);
            for (p, q) in a.probs.iter().zip(&b.probs) {
                assert!((p - q).abs() < 1e-9, "same seed produced different models");
            }
        }
    }
}
