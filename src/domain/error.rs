// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure in the pipeline falls into one of five classes:
//
//   Config  — bad or missing configuration, empty usable dataset
//   Data    — unresolvable join keys, missing covariates, bad tables
//   Schema  — deploy-time mismatch between artifact and new data
//   Numeric — non-finite loss or probabilities during training
//   Io      — unreadable feature files or tables
//
// Per-row problems (an unresolvable slide, a missing feature file)
// are recovered locally by the joiner and only surface as counted
// diagnostics. Whole-dataset or schema problems are fatal and carry
// the offending identifiers in their message.
//
// The application layer wraps these in anyhow with added context;
// the CLI turns them into a non-zero exit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad or missing configuration, or a dataset that is empty
    /// after joining and filtering.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed tabular input or unresolvable required values.
    /// The message names the offending patients/columns.
    #[error("data error: {0}")]
    Data(String),

    /// Deploy-time mismatch between a ModelArtifact's expectations
    /// and the new dataset. Always names the mismatched field.
    #[error("schema mismatch in {field}: model expects {expected}, data has {found}")]
    Schema {
        field:    String,
        expected: String,
        found:    String,
    },

    /// Non-finite loss or gradients — training is aborted rather
    /// than silently continuing on garbage numbers.
    #[error("numeric error: {0}")]
    Numeric(String),

    /// An unreadable file, with the path that failed.
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Attach a path to a raw io::Error.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
