// ============================================================
// Layer 4 — Bag Batcher / Collator
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<PatientSample>
// into tensors. Patient bags have different tile counts, so the
// batcher pads every bag to the longest one in the batch with
// zero vectors and emits a boolean validity mask:
//
//   bags: [batch, max_tiles, dim]     zero-filled past each bag
//   mask: [batch, max_tiles]          true = real tile
//
// The model gives masked positions −∞ attention scores, so padding
// contributes no attention weight and no gradient.
//
// Bag capping: when a bag exceeds `max_bag_size`, a uniform random
// subsample without replacement is drawn. The draw is seeded from
// (run seed, patient id), so a fixed seed reproduces the exact
// same batches; deployment runs without a cap, so inference sees
// the full bag and is deterministic.
//
// Reference: Burn Book §4 (Batcher)

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::data::joiner::PatientSample;

/// A batch of patient bags ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct MilBatch<B: Backend> {
    /// Padded tile features — shape: [batch, max_tiles, dim]
    pub bags: Tensor<B, 3>,

    /// Validity mask — shape: [batch, max_tiles]; true = real tile
    pub mask: Tensor<B, 2, Bool>,

    /// Encoded covariates — shape: [batch, cov_dim];
    /// None when no covariates were configured
    pub covariates: Option<Tensor<B, 2>>,

    /// Class indices — shape: [batch]; unlabeled samples hold 0 and
    /// must only be interpreted through `labels`
    pub targets: Tensor<B, 1, Int>,

    /// Per-sample label indices (None = target unknown)
    pub labels: Vec<Option<usize>>,

    /// Per-sample patient ids, for prediction bookkeeping
    pub patient_ids: Vec<String>,
}

/// The batcher — holds the target device, the optional bag cap,
/// and the run seed the cap's subsampling derives from.
#[derive(Clone, Debug)]
pub struct BagBatcher<B: Backend> {
    pub device: B::Device,
    max_bag_size: Option<usize>,
    seed: u64,
}

impl<B: Backend> BagBatcher<B> {
    /// A batcher without a bag cap (deployment/validation).
    pub fn new(device: B::Device) -> Self {
        Self { device, max_bag_size: None, seed: 0 }
    }

    /// A batcher that caps bags at `max_bag_size` tiles, drawing the
    /// subsample deterministically from `seed` and the patient id.
    pub fn with_cap(device: B::Device, max_bag_size: Option<usize>, seed: u64) -> Self {
        Self { device, max_bag_size, seed }
    }

    /// Tile indices to keep for one sample: all of them, or a seeded
    /// uniform subsample without replacement above the cap.
    fn kept_tiles(&self, sample: &PatientSample) -> Vec<usize> {
        match self.max_bag_size {
            Some(cap) if sample.n_tiles > cap => {
                let mut hasher = DefaultHasher::new();
                sample.patient_id.hash(&mut hasher);
                let mut rng = StdRng::seed_from_u64(self.seed ^ hasher.finish());

                let mut picked = rand::seq::index::sample(&mut rng, sample.n_tiles, cap)
                    .into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..sample.n_tiles).collect(),
        }
    }
}

impl<B: Backend> Batcher<PatientSample, MilBatch<B>> for BagBatcher<B> {
    fn batch(&self, items: Vec<PatientSample>) -> MilBatch<B> {
        let batch_size = items.len();
        let dim        = items[0].dim;
        let cov_dim    = items[0].covariates.len();

        let kept: Vec<Vec<usize>> = items.iter().map(|s| self.kept_tiles(s)).collect();
        let max_tiles = kept.iter().map(Vec::len).max().unwrap_or(0).max(1);

        // ── Pad bags and build the mask ───────────────────────────────────────
        // Zeros are a neutral fill; the mask is what actually keeps
        // padded positions out of the attention pool.
        let mut bag_flat  = vec![0.0f32; batch_size * max_tiles * dim];
        let mut mask_flat = vec![0i32; batch_size * max_tiles];

        for (b, (sample, tiles)) in items.iter().zip(&kept).enumerate() {
            for (t, &tile) in tiles.iter().enumerate() {
                let src = &sample.features[tile * dim..(tile + 1) * dim];
                let dst = (b * max_tiles + t) * dim;
                bag_flat[dst..dst + dim].copy_from_slice(src);
                mask_flat[b * max_tiles + t] = 1;
            }
        }

        let bags = Tensor::<B, 1>::from_floats(bag_flat.as_slice(), &self.device)
            .reshape([batch_size, max_tiles, dim]);

        let mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), &self.device)
            .reshape([batch_size, max_tiles])
            .equal_elem(1);

        // ── Covariates ────────────────────────────────────────────────────────
        let covariates = (cov_dim > 0).then(|| {
            let cov_flat: Vec<f32> = items
                .iter()
                .flat_map(|s| s.covariates.iter().copied())
                .collect();
            Tensor::<B, 1>::from_floats(cov_flat.as_slice(), &self.device)
                .reshape([batch_size, cov_dim])
        });

        // ── Targets ───────────────────────────────────────────────────────────
        let labels: Vec<Option<usize>> = items.iter().map(|s| s.label).collect();
        let target_flat: Vec<i32> = labels
            .iter()
            .map(|l| l.unwrap_or(0) as i32)
            .collect();
        let targets = Tensor::<B, 1, Int>::from_ints(target_flat.as_slice(), &self.device);

        MilBatch {
            bags,
            mask,
            covariates,
            targets,
            labels,
            patient_ids: items.into_iter().map(|s| s.patient_id).collect(),
        }
    }
}
