// ============================================================
// Layer 5 — Bootstrap Confidence Intervals
// ============================================================
// Percentile bootstrap for AUC: resample the (score, label) pairs
// with replacement B times, recompute the AUC on each resample, and
// take the 2.5th/97.5th percentiles of the replicate distribution.
//
// A resample can lose every positive (or negative) by chance; its
// AUC is undefined and the replicate is skipped, with the skip
// count reported so callers can see how unstable the estimate is.
//
// Reference: Efron & Tibshirani (1993) An Introduction to the Bootstrap

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::error::{PipelineError, Result};
use crate::stats::roc::roc_curve;

/// A percentile bootstrap interval for one class's AUC.
#[derive(Debug, Clone)]
pub struct AucInterval {
    pub auc:        f64,
    pub lower:      f64,
    pub upper:      f64,
    pub n_resamples: usize,
    pub n_skipped:  usize,
}

/// 95% percentile bootstrap interval for the AUC of `scores` vs
/// `labels`. Requires the point estimate itself to be defined.
pub fn bootstrap_auc(
    scores:      &[f64],
    labels:      &[bool],
    n_bootstrap: usize,
    seed:        u64,
) -> Result<AucInterval> {
    if n_bootstrap == 0 {
        return Err(PipelineError::Config("n_bootstrap must be at least 1".into()));
    }
    let point = roc_curve(scores, labels)
        .ok_or_else(|| {
            PipelineError::Data(
                "AUC undefined: need at least one positive and one negative example".into(),
            )
        })?
        .auc;

    let mut rng = StdRng::seed_from_u64(seed);
    let n = scores.len();
    let mut replicates = Vec::with_capacity(n_bootstrap);
    let mut skipped = 0usize;

    let mut resampled_scores = vec![0.0f64; n];
    let mut resampled_labels = vec![false; n];
    for _ in 0..n_bootstrap {
        for slot in 0..n {
            let pick = rng.gen_range(0..n);
            resampled_scores[slot] = scores[pick];
            resampled_labels[slot] = labels[pick];
        }
        match roc_curve(&resampled_scores, &resampled_labels) {
            Some(curve) => replicates.push(curve.auc),
            None => skipped += 1,
        }
    }

    if replicates.is_empty() {
        return Err(PipelineError::Data(format!(
            "all {n_bootstrap} bootstrap resamples were degenerate, no interval available"
        )));
    }

    replicates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(AucInterval {
        auc:         point,
        lower:       percentile(&replicates, 0.025),
        upper:       percentile(&replicates, 0.975),
        n_resamples: replicates.len(),
        n_skipped:   skipped,
    })
}

/// Linear-interpolation percentile of an already-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
