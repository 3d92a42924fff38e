// ============================================================
// Layer 2 — RocUseCase
// ============================================================
// Turns a prediction table into ROC statistics:
//
//   Step 1: Read the prediction table     (Layer 6 - infra)
//   Step 2: One-vs-rest ROC per category  (Layer 5 - stats)
//   Step 3: Bootstrap AUC intervals       (Layer 5 - stats)
//   Step 4: Write summary + curve CSVs    (here)
//
// Output layout under the run directory:
//
//   roc-stats.csv         ← one row per category (+ macro average)
//   roc-curve_<cat>.csv   ← threshold,fpr,tpr points per category
//
// Categories whose AUC is undefined (no positives or no negatives)
// get an empty auc cell in the summary and no curve file.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::domain::error::PipelineError;
use crate::domain::records::PredictionRecord;
use crate::infra::predictions::read_predictions;
use crate::stats::bootstrap::{bootstrap_auc, AucInterval};
use crate::stats::roc::{macro_auc, one_vs_rest, ClassRoc};

pub struct RocUseCase {
    pred_table:  String,
    output_path: String,
    n_bootstrap: usize,
    seed:        u64,
}

impl RocUseCase {
    pub fn new(pred_table: String, output_path: String, n_bootstrap: usize, seed: u64) -> Self {
        Self { pred_table, output_path, n_bootstrap, seed }
    }

    /// Execute the full ROC analysis end to end.
    pub fn execute(&self) -> Result<()> {
        let out = Path::new(&self.output_path);

        // ── Step 1: Read predictions ──────────────────────────────────────────
        let (predictions, categories) = read_predictions(Path::new(&self.pred_table))
            .with_context(|| format!("reading the prediction table '{}'", self.pred_table))?;
        let n_labeled = predictions.iter().filter(|p| p.true_label.is_some()).count();
        if n_labeled == 0 {
            anyhow::bail!(
                "'{}' has no rows with a true label, nothing to evaluate",
                self.pred_table
            );
        }
        tracing::info!(
            "{} predictions ({} labeled), categories {categories:?}",
            predictions.len(),
            n_labeled,
        );

        // ── Step 2 + 3: Curves, then intervals where defined ──────────────────
        let per_class = one_vs_rest(&predictions, &categories);
        let intervals = self.intervals(&predictions, &per_class)?;

        // ── Step 4: Write outputs ─────────────────────────────────────────────
        fs::create_dir_all(out)
            .map_err(|e| PipelineError::io(out.display().to_string(), e))?;
        self.write_summary(out, &per_class, &intervals)?;
        for class in &per_class {
            if let Some(curve) = &class.curve {
                write_curve(&out.join(format!("roc-curve_{}.csv", class.category)), curve)?;
            }
        }

        if let Some(avg) = macro_auc(&per_class) {
            tracing::info!("macro-average AUC over defined categories: {avg:.4}");
        }
        Ok(())
    }

    /// One bootstrap interval per category with a defined AUC. Each
    /// category draws from its own derived seed so adding a category
    /// does not shift the others' resamples.
    fn intervals(
        &self,
        predictions: &[PredictionRecord],
        per_class:   &[ClassRoc],
    ) -> Result<Vec<Option<AucInterval>>> {
        let labeled: Vec<&PredictionRecord> = predictions
            .iter()
            .filter(|p| p.true_label.is_some())
            .collect();

        per_class
            .iter()
            .enumerate()
            .map(|(class, roc)| {
                if roc.curve.is_none() {
                    return Ok(None);
                }
                let scores: Vec<f64> = labeled.iter().map(|p| p.probs[class]).collect();
                let labels: Vec<bool> = labeled
                    .iter()
                    .map(|p| p.true_label.as_deref() == Some(roc.category.as_str()))
                    .collect();
                let interval = bootstrap_auc(&scores, &labels, self.n_bootstrap, self.seed.wrapping_add(class as u64))
                    .with_context(|| format!("bootstrapping category '{}'", roc.category))?;
                if interval.n_skipped > 0 {
                    tracing::warn!(
                        "category '{}': {} of {} bootstrap resamples were degenerate",
                        roc.category,
                        interval.n_skipped,
                        self.n_bootstrap,
                    );
                }
                Ok(Some(interval))
            })
            .collect()
    }

    fn write_summary(
        &self,
        out:       &Path,
        per_class: &[ClassRoc],
        intervals: &[Option<AucInterval>],
    ) -> Result<()> {
        let path = out.join("roc-stats.csv");
        let mut writer = csv::Writer::from_path(&path)?;

        writer.write_record(["category", "positives", "negatives", "auc", "ci_lower", "ci_upper"])?;
        for (class, interval) in per_class.iter().zip(intervals) {
            let (auc, lower, upper) = match interval {
                Some(ci) => (
                    format!("{:.6}", ci.auc),
                    format!("{:.6}", ci.lower),
                    format!("{:.6}", ci.upper),
                ),
                None => (String::new(), String::new(), String::new()),
            };
            writer.write_record([
                class.category.clone(),
                class.positives.to_string(),
                class.negatives.to_string(),
                auc,
                lower,
                upper,
            ])?;
        }
        if let Some(avg) = macro_auc(per_class) {
            writer.write_record([
                "macro".to_string(),
                String::new(),
                String::new(),
                format!("{avg:.6}"),
                String::new(),
                String::new(),
            ])?;
        }
        writer
            .flush()
            .map_err(|e| PipelineError::io(path.display().to_string(), e))?;

        tracing::info!("wrote ROC summary to '{}'", path.display());
        Ok(())
    }
}

fn write_curve(path: &Path, curve: &crate::stats::roc::RocCurve) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["threshold", "fpr", "tpr"])?;
    for p in &curve.points {
        writer.write_record([
            p.threshold.to_string(),
            format!("{:.6}", p.fpr),
            format!("{:.6}", p.tpr),
        ])?;
    }
    writer
        .flush()
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    Ok(())
}
