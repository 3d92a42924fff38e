// ============================================================
// Layer 5 — Deployer
// ============================================================
// Scores patients with an already-trained model. Deployment is a
// pure read: load model + read data → write predictions, with no
// training side effects and no artifact mutation.
//
// Schema compatibility (feature dimensionality, covariate
// names/order, category list) is validated BEFORE any inference —
// a mismatch fails fast with a SchemaError naming the field and
// produces zero PredictionRecords.
//
// Inference always sees full bags (no subsampling), so deployment
// output is deterministic for a given artifact and dataset.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::data::batcher::BagBatcher;
use crate::data::joiner::{JoinedDataset, PatientSample};
use crate::domain::error::{PipelineError, Result};
use crate::domain::records::PredictionRecord;
use crate::infra::artifact::ArtifactMeta;
use crate::ml::model::AttentionMilModel;
use crate::ml::{InferBackend, ModelingRuntime};

/// Validate the artifact against the joined dataset, then score
/// every joined patient (labeled or not).
pub fn deploy(
    runtime:    &ModelingRuntime,
    model:      &AttentionMilModel<InferBackend>,
    meta:       &ArtifactMeta,
    joined:     &JoinedDataset,
    batch_size: usize,
) -> Result<Vec<PredictionRecord>> {
    meta.validate_schema(joined)?;

    if joined.samples.is_empty() {
        return Err(PipelineError::Config(
            "no usable patients left after joining — nothing to score".into(),
        ));
    }

    score_samples(
        model,
        &joined.samples,
        &meta.categories,
        &runtime.device,
        batch_size,
        None,
    )
}

/// Score a set of patient samples with full (uncapped) bags.
/// `fold` tags cross-validation output; None for train/deploy.
pub fn score_samples<B: Backend>(
    model:      &AttentionMilModel<B>,
    samples:    &[PatientSample],
    categories: &[String],
    device:     &B::Device,
    batch_size: usize,
    fold:       Option<usize>,
) -> Result<Vec<PredictionRecord>> {
    let batcher = BagBatcher::<B>::new(device.clone());
    let mut records = Vec::with_capacity(samples.len());

    for chunk in samples.chunks(batch_size.max(1)) {
        let batch = batcher.batch(chunk.to_vec());
        let (labels, patient_ids) = (batch.labels.clone(), batch.patient_ids.clone());

        let probs = model.forward_probs(batch.bags, batch.mask, batch.covariates);
        let flat: Vec<f32> = probs
            .into_data()
            .to_vec()
            .map_err(|e| PipelineError::Numeric(format!("cannot read probabilities: {e:?}")))?;

        let n_classes = categories.len();
        for (row, (patient_id, label)) in patient_ids.into_iter().zip(labels).enumerate() {
            let probs: Vec<f64> = flat[row * n_classes..(row + 1) * n_classes]
                .iter()
                .map(|&p| p as f64)
                .collect();

            records.push(PredictionRecord {
                pred_label: categories[PredictionRecord::argmax(&probs)].clone(),
                true_label: label.map(|l| categories[l].clone()),
                patient_id,
                fold,
                probs,
            });
        }
    }

    Ok(records)
}
