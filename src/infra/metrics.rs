// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends epoch-level training metrics to a CSV file so learning
// curves can be inspected after a run:
//
//   epoch,train_loss,val_loss
//   1,0.693100,0.691200
//   2,0.654800,0.662300
//   ...
//
// If val_loss rises while train_loss keeps falling, the model is
// overfitting and the early-stopping patience did its job.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::domain::error::{PipelineError, Result};
use crate::ml::trainer::EpochMetrics;

/// Logs epoch metrics to `<dir>/metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write the CSV header if the file
    /// does not exist yet; existing logs are appended to.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir.display().to_string(), e))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .map_err(|e| PipelineError::io(csv_path.display().to_string(), e))?;
            writeln!(f, "epoch,train_loss,val_loss")
                .map_err(|e| PipelineError::io(csv_path.display().to_string(), e))?;
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| PipelineError::io(self.csv_path.display().to_string(), e))?;

        writeln!(f, "{},{:.6},{:.6}", m.epoch, m.train_loss, m.val_loss)
            .map_err(|e| PipelineError::io(self.csv_path.display().to_string(), e))?;
        Ok(())
    }

    /// Log a whole fit's history at once.
    pub fn log_all(&self, metrics: &[EpochMetrics]) -> Result<()> {
        for m in metrics {
            self.log(m)?;
        }
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
