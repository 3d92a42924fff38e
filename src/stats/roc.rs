// ============================================================
// Layer 5 — ROC Curves and AUC
// ============================================================
// Builds ROC curves by sweeping a threshold down the sorted scores
// and computes AUC by trapezoidal integration over the resulting
// step curve. For perfectly separable inputs this yields exactly
// 1.0; ties in the scores are handled by emitting one point per
// DISTINCT score, never one per sample.
//
// Reference: Fawcett (2006) An introduction to ROC analysis

use crate::domain::records::PredictionRecord;

/// One operating point of a ROC curve.
#[derive(Debug, Clone, PartialEq)]
pub struct RocPoint {
    pub fpr:       f64,
    pub tpr:       f64,
    pub threshold: f64,
}

/// A complete ROC curve with its area.
#[derive(Debug, Clone)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    pub auc:    f64,
}

/// One category's one-vs-rest evaluation. `curve` is None when the
/// class has no positives or no negatives in the input.
#[derive(Debug, Clone)]
pub struct ClassRoc {
    pub category:  String,
    pub positives: usize,
    pub negatives: usize,
    pub curve:     Option<RocCurve>,
}

/// ROC curve for binary scores/labels. Returns None when either
/// class is absent — the AUC is undefined, not zero.
pub fn roc_curve(scores: &[f64], labels: &[bool]) -> Option<RocCurve> {
    debug_assert_eq!(scores.len(), labels.len());
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    // Sweep thresholds from high to low score
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut points = vec![RocPoint { fpr: 0.0, tpr: 0.0, threshold: f64::INFINITY }];
    let mut tp = 0usize;
    let mut fp = 0usize;

    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // Consume the whole tie group before emitting a point
        while i < order.len() && scores[order[i]] == threshold {
            if labels[order[i]] {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push(RocPoint {
            fpr: fp as f64 / negatives as f64,
            tpr: tp as f64 / positives as f64,
            threshold,
        });
    }

    // Trapezoidal integration over the step curve
    let mut auc = 0.0;
    for pair in points.windows(2) {
        auc += (pair[1].fpr - pair[0].fpr) * (pair[1].tpr + pair[0].tpr) / 2.0;
    }

    Some(RocCurve { points, auc })
}

/// One-vs-rest evaluation of every category over a prediction
/// table. Records without a known true label are skipped.
pub fn one_vs_rest(predictions: &[PredictionRecord], categories: &[String]) -> Vec<ClassRoc> {
    let labeled: Vec<&PredictionRecord> = predictions
        .iter()
        .filter(|p| p.true_label.is_some())
        .collect();

    categories
        .iter()
        .enumerate()
        .map(|(class, category)| {
            let scores: Vec<f64> = labeled.iter().map(|p| p.probs[class]).collect();
            let labels: Vec<bool> = labeled
                .iter()
                .map(|p| p.true_label.as_deref() == Some(category.as_str()))
                .collect();

            let positives = labels.iter().filter(|&&l| l).count();
            let negatives = labels.len() - positives;
            let curve = roc_curve(&scores, &labels);
            if curve.is_none() {
                tracing::warn!(
                    "category '{category}': AUC undefined ({positives} positives, \
                     {negatives} negatives) — excluded from the macro average"
                );
            }

            ClassRoc { category: category.clone(), positives, negatives, curve }
        })
        .collect()
}

/// Mean AUC over the categories where it is defined.
pub fn macro_auc(per_class: &[ClassRoc]) -> Option<f64> {
    let defined: Vec<f64> = per_class
        .iter()
        .filter_map(|c| c.curve.as_ref().map(|r| r.auc))
        .collect();
    (!defined.is_empty()).then(|| defined.iter().sum::<f64>() / defined.len() as f64)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_separation_gives_auc_one() {
        let scores = [0.9, 0.8, 0.7, 0.3, 0.2, 0.1];
        let labels = [true, true, true, false, false, false];
        let curve = roc_curve(&scores, &labels).unwrap();
        assert_eq!(curve.auc, 1.0);
    }

    #[test]
    fn test_inverted_scores_give_auc_zero() {
        let scores = [0.1, 0.2, 0.9];
        let labels = [true, true, false];
        let curve = roc_curve(&scores, &labels).unwrap();
        assert_eq!(curve.auc, 0.0);
    }

    #[test]
    fn test_all_tied_scores_give_auc_half() {
        let scores = [0.5, 0.5, 0.5, 0.5];
        let labels = [true, false, true, false];
        let curve = roc_curve(&scores, &labels).unwrap();
        assert!((curve.auc - 0.5).abs() < 1e-12);
        // (0,0) plus one point for the single tie group
        assert_eq!(curve.points.len(), 2);
    }

    #[test]
    fn test_degenerate_input_is_undefined_not_zero() {
        assert!(roc_curve(&[0.4, 0.6], &[true, true]).is_none());
        assert!(roc_curve(&[0.4, 0.6], &[false, false]).is_none());
    }

    #[test]
    fn test_curve_endpoints() {
        let scores = [0.8, 0.6, 0.4, 0.2];
        let labels = [true, false, true, false];
        let curve = roc_curve(&scores, &labels).unwrap();

        let first = curve.points.first().unwrap();
        let last = curve.points.last().unwrap();
        assert_eq!((first.fpr, first.tpr), (0.0, 0.0));
        assert_eq!((last.fpr, last.tpr), (1.0, 1.0));
    }

    fn record(id: &str, truth: Option<&str>, probs: Vec<f64>) -> PredictionRecord {
        PredictionRecord {
            patient_id: id.into(),
            fold:       None,
            true_label: truth.map(str::to_string),
            pred_label: "x".into(),
            probs,
        }
    }

    #[test]
    fn test_one_vs_rest_excludes_degenerate_class() {
        let categories: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        // No patient is actually class c → its AUC is undefined
        let predictions = vec![
            record("p1", Some("a"), vec![0.8, 0.1, 0.1]),
            record("p2", Some("a"), vec![0.7, 0.2, 0.1]),
            record("p3", Some("b"), vec![0.2, 0.7, 0.1]),
            record("p4", Some("b"), vec![0.1, 0.8, 0.1]),
        ];

        let per_class = one_vs_rest(&predictions, &categories);
        assert!(per_class[0].curve.is_some());
        assert!(per_class[1].curve.is_some());
        assert!(per_class[2].curve.is_none());

        // Macro average only over the defined classes
        let macro_avg = macro_auc(&per_class).unwrap();
        assert_eq!(macro_avg, 1.0);
    }

    #[test]
    fn test_one_vs_rest_skips_unlabeled_records() {
        let categories: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let predictions = vec![
            record("p1", Some("a"), vec![0.9, 0.1]),
            record("p2", Some("b"), vec![0.2, 0.8]),
            record("p3", None, vec![0.5, 0.5]),
        ];
        let per_class = one_vs_rest(&predictions, &categories);
        assert_eq!(per_class[0].positives + per_class[0].negatives, 2);
    }
}
