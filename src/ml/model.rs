// ============================================================
// Layer 5 — Attention-MIL Model
// ============================================================
// Maps a masked patient bag (and optional covariates) to a
// probability distribution over the target categories:
//
//   tiles [b, n, dim]
//     → shared projection + ReLU (+ dropout)      [b, n, d_model]
//     → tanh MLP → one attention score per tile   [b, n]
//     → masked softmax (padding → −∞ score)       [b, n]
//     → weighted sum over tiles                   [b, d_model]
//     → concat encoded covariates                 [b, d_model + cov]
//     → linear head → logits                      [b, n_classes]
//
// The pooling is a weighted sum over an unordered set of tiles, so
// the model is permutation invariant, and masked positions receive
// exactly zero post-softmax weight — both are tested properties.
//
// Loss: categorical cross-entropy, optionally class-balanced with
// inverse-frequency weights from the training labels.
//
// Reference: Ilse et al. (2018) Attention-based Deep MIL
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::data::batcher::MilBatch;

/// Finite stand-in for −∞: large enough that softmax assigns padded
/// positions exactly zero weight in f32, small enough that the
/// max-subtraction inside softmax never produces NaN.
const MASKED_SCORE: f32 = -1.0e30;

// NOTE: #[derive(Config)] already generates Clone and
// Serialize/Deserialize internally — do not add them again.
#[derive(Config, Debug)]
pub struct AttentionMilConfig {
    /// Fixed tile-feature dimensionality the model is trained on
    pub feature_dim: usize,

    /// Number of target categories
    pub n_classes: usize,

    /// Width of the encoded covariate vector (0 = no covariates)
    pub covariate_dim: usize,

    /// Hidden width of the per-tile projection
    pub d_model: usize,

    /// Hidden width of the attention-scoring MLP
    pub d_attn: usize,

    /// Dropout probability on the projected tiles
    pub dropout: f64,
}

impl AttentionMilConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionMilModel<B> {
        AttentionMilModel {
            encoder:     LinearConfig::new(self.feature_dim, self.d_model).init(device),
            attn_hidden: LinearConfig::new(self.d_model, self.d_attn).init(device),
            attn_score:  LinearConfig::new(self.d_attn, 1).init(device),
            head:        LinearConfig::new(self.d_model + self.covariate_dim, self.n_classes)
                .init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionMilModel<B: Backend> {
    pub encoder:     Linear<B>,
    pub attn_hidden: Linear<B>,
    pub attn_score:  Linear<B>,
    pub head:        Linear<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> AttentionMilModel<B> {
    /// bags: [batch, n_tiles, dim], mask: [batch, n_tiles]
    /// → logits: [batch, n_classes]
    pub fn forward(
        &self,
        bags:       Tensor<B, 3>,
        mask:       Tensor<B, 2, Bool>,
        covariates: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        let [batch, n_tiles, _] = bags.dims();

        let tiles = self.dropout.forward(activation::relu(self.encoder.forward(bags)));
        let d_model = tiles.dims()[2];

        // One scalar attention score per tile
        let scores = self
            .attn_score
            .forward(activation::tanh(self.attn_hidden.forward(tiles.clone())))
            .reshape([batch, n_tiles]);

        // Softmax restricted to unmasked positions — padded tiles get
        // zero weight and therefore contribute no gradient either.
        let weights = masked_softmax(scores, mask);

        // Weighted sum: [b, 1, n] × [b, n, d] → [b, d]
        let pooled = weights
            .reshape([batch, 1, n_tiles])
            .matmul(tiles)
            .reshape([batch, d_model]);

        let pooled = match covariates {
            Some(cov) => Tensor::cat(vec![pooled, cov], 1),
            None => pooled,
        };

        self.head.forward(pooled)
    }

    /// Probabilities over the category order: [batch, n_classes].
    pub fn forward_probs(
        &self,
        bags:       Tensor<B, 3>,
        mask:       Tensor<B, 2, Bool>,
        covariates: Option<Tensor<B, 2>>,
    ) -> Tensor<B, 2> {
        activation::softmax(self.forward(bags, mask, covariates), 1)
    }

    /// Cross-entropy loss for one batch, optionally class-weighted.
    pub fn forward_loss(
        &self,
        batch:         MilBatch<B>,
        class_weights: Option<&[f32]>,
    ) -> Tensor<B, 1> {
        let logits = self.forward(batch.bags, batch.mask, batch.covariates);

        let mut ce = CrossEntropyLossConfig::new();
        if let Some(w) = class_weights {
            ce = ce.with_weights(Some(w.to_vec()));
        }
        ce.init(&logits.device()).forward(logits, batch.targets)
    }
}

/// Softmax over dim 1 with masked positions forced to (effectively)
/// −∞ beforehand, guaranteeing zero post-softmax weight.
fn masked_softmax<B: Backend>(scores: Tensor<B, 2>, mask: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
    let scores = scores.mask_fill(mask.bool_not(), MASKED_SCORE);
    activation::softmax(scores, 1)
}

/// Inverse-frequency class weights from the training labels:
/// w_c = n / (k * n_c). A class absent from the split keeps
/// weight 1.0 so the loss stays well-defined.
pub fn class_weights(labels: &[usize], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &l in labels {
        counts[l] += 1;
    }
    let n = labels.len() as f32;
    counts
        .iter()
        .map(|&c| if c == 0 { 1.0 } else { n / (n_classes as f32 * c as f32) })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn tiny_model(dim: usize) -> AttentionMilModel<TestBackend> {
        // Dropout 0 keeps the forward pass deterministic
        AttentionMilConfig::new(dim, 2, 0, 8, 4, 0.0).init(&Default::default())
    }

    fn bag_tensor(rows: &[&[f32]]) -> Tensor<TestBackend, 3> {
        let dim = rows[0].len();
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<TestBackend, 1>::from_floats(flat.as_slice(), &Default::default())
            .reshape([1, rows.len(), dim])
    }

    fn mask_tensor(valid: &[bool]) -> Tensor<TestBackend, 2, Bool> {
        let ints: Vec<i32> = valid.iter().map(|&v| i32::from(v)).collect();
        Tensor::<TestBackend, 1, Int>::from_ints(ints.as_slice(), &Default::default())
            .reshape([1, valid.len()])
            .equal_elem(1)
    }

    fn probs(model: &AttentionMilModel<TestBackend>, rows: &[&[f32]], valid: &[bool]) -> Vec<f32> {
        model
            .forward_probs(bag_tensor(rows), mask_tensor(valid), None)
            .into_data()
            .to_vec()
            .unwrap()
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let model = tiny_model(3);
        let p = probs(&model, &[&[0.5, -1.0, 2.0], &[1.5, 0.0, -0.5]], &[true, true]);
        let sum: f32 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "probs summed to {sum}");
    }

    #[test]
    fn test_permutation_invariance() {
        let model = tiny_model(3);
        let a: &[f32] = &[0.5, -1.0, 2.0];
        let b: &[f32] = &[1.5, 0.0, -0.5];
        let c: &[f32] = &[-0.3, 0.9, 0.1];

        let original = probs(&model, &[a, b, c], &[true, true, true]);
        let permuted = probs(&model, &[c, a, b], &[true, true, true]);

        for (x, y) in original.iter().zip(&permuted) {
            assert!((x - y).abs() < 1e-5, "permuting tiles changed the output");
        }
    }

    #[test]
    fn test_masked_padding_does_not_change_output() {
        let model = tiny_model(2);
        let a: &[f32] = &[0.7, -0.2];
        let b: &[f32] = &[1.1, 0.4];
        let zero: &[f32] = &[0.0, 0.0];

        let bare   = probs(&model, &[a, b], &[true, true]);
        let padded = probs(&model, &[a, b, zero, zero], &[true, true, false, false]);

        for (x, y) in bare.iter().zip(&padded) {
            assert!((x - y).abs() < 1e-5, "masked padding leaked into the output");
        }
    }

    #[test]
    fn test_masked_softmax_zeroes_padded_positions() {
        let scores = Tensor::<TestBackend, 1>::from_floats(
            [1.0f32, 2.0, 3.0].as_slice(),
            &Default::default(),
        )
        .reshape([1, 3]);
        let weights: Vec<f32> = masked_softmax(scores, mask_tensor(&[true, true, false]))
            .into_data()
            .to_vec()
            .unwrap();

        assert!(weights[2].abs() < 1e-12);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_class_weights_inverse_frequency() {
        // 3 of class 0, 1 of class 1 → minority upweighted
        let w = class_weights(&[0, 0, 0, 1], 2);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-6);
        assert!((w[1] - 4.0 / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_class_weights_absent_class_defaults_to_one() {
        let w = class_weights(&[0, 0], 3);
        assert_eq!(w[1], 1.0);
        assert_eq!(w[2], 1.0);
    }
}
