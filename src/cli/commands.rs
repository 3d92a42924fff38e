// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands: `train`, `crossval`, `deploy`
// and `roc`, with all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Flag names use underscores (--clini_table, --target_label) to
// match the column conventions of the input tables.

use clap::{Args, Subcommand};

use crate::application::DataConfig;
use crate::ml::trainer::FitConfig;

/// The four top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one model on every labeled patient
    Train(TrainArgs),

    /// k-fold cross-validation with an out-of-fold prediction table
    Crossval(CrossvalArgs),

    /// Score a new cohort with a trained model artifact
    Deploy(DeployArgs),

    /// ROC curves, AUCs and bootstrap intervals for a prediction table
    Roc(RocArgs),
}

// ─── Shared Dataset Arguments ────────────────────────────────────────────────
// The three input files plus the clinical columns of interest,
// shared by train and crossval.
#[derive(Args, Debug)]
pub struct DataArgs {
    /// Clinical table CSV, one row per patient (PATIENT column)
    #[arg(long = "clini_table")]
    pub clini_table: String,

    /// Slide index CSV mapping FILENAME to PATIENT
    #[arg(long = "slide_csv")]
    pub slide_csv: String,

    /// Directory containing one tile-feature file per slide
    #[arg(long = "feature_dir")]
    pub feature_dir: String,

    /// Directory to write all run outputs into
    #[arg(long = "output_path")]
    pub output_path: String,

    /// Clinical column holding the prediction target
    #[arg(long = "target_label")]
    pub target_label: String,

    /// Categorical covariate columns (repeat the flag per column)
    #[arg(long = "cat_labels")]
    pub cat_labels: Vec<String>,

    /// Continuous covariate columns (repeat the flag per column)
    #[arg(long = "cont_labels")]
    pub cont_labels: Vec<String>,

    /// Explicit target category order (repeat the flag per value);
    /// omitted = sorted observed values
    #[arg(long = "categories")]
    pub categories: Vec<String>,
}

impl From<DataArgs> for DataConfig {
    fn from(a: DataArgs) -> Self {
        DataConfig {
            clini_table:  a.clini_table,
            slide_csv:    a.slide_csv,
            feature_dir:  a.feature_dir,
            output_path:  a.output_path,
            target_label: a.target_label,
            cat_labels:   a.cat_labels,
            cont_labels:  a.cont_labels,
            categories:   (!a.categories.is_empty()).then_some(a.categories),
        }
    }
}

// ─── Shared Fitting Arguments ────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Fraction of training patients held out for early stopping
    #[arg(long = "val_fraction")]
    pub val_fraction: f64,

    /// Number of bags per training batch
    #[arg(long = "batch_size", default_value_t = 8)]
    pub batch_size: usize,

    /// Upper bound on training epochs
    #[arg(long = "max_epochs", default_value_t = 32)]
    pub max_epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Epochs without validation improvement before stopping
    #[arg(long, default_value_t = 8)]
    pub patience: usize,

    /// Random subsample cap on tiles per bag during training;
    /// omitted = always train on full bags
    #[arg(long = "max_bag_size")]
    pub max_bag_size: Option<usize>,

    /// Weight the loss by inverse training-label frequency
    #[arg(long = "class_weights", default_value_t = false)]
    pub class_weights: bool,

    /// Seed for splits, shuffling, subsampling and weight init
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Width of the per-tile encoder
    #[arg(long = "d_model", default_value_t = 256)]
    pub d_model: usize,

    /// Width of the attention scoring MLP
    #[arg(long = "d_attn", default_value_t = 128)]
    pub d_attn: usize,

    /// Dropout probability in the encoder and attention MLP
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

impl From<FitArgs> for FitConfig {
    fn from(a: FitArgs) -> Self {
        FitConfig {
            batch_size:    a.batch_size,
            max_epochs:    a.max_epochs,
            lr:            a.lr,
            patience:      a.patience,
            val_fraction:  a.val_fraction,
            max_bag_size:  a.max_bag_size,
            class_weights: a.class_weights,
            seed:          a.seed,
            d_model:       a.d_model,
            d_attn:        a.d_attn,
            dropout:       a.dropout,
        }
    }
}

/// All arguments for the `train` command
#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub fit: FitArgs,
}

/// All arguments for the `crossval` command
#[derive(Args, Debug)]
pub struct CrossvalArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub fit: FitArgs,

    /// Number of cross-validation folds
    #[arg(long = "n_splits", default_value_t = 5)]
    pub n_splits: usize,
}

/// All arguments for the `deploy` command.
/// The artifact records which covariate columns and categories it
/// was fitted on; flags given here are checked against that record
/// and a mismatch is a schema error, never a silent re-encoding.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Clinical table CSV for the cohort to score
    #[arg(long = "clini_table")]
    pub clini_table: String,

    /// Slide index CSV for the cohort to score
    #[arg(long = "slide_csv")]
    pub slide_csv: String,

    /// Directory of tile-feature files for the cohort to score
    #[arg(long = "feature_dir")]
    pub feature_dir: String,

    /// Directory to write the prediction table into
    #[arg(long = "output_path")]
    pub output_path: String,

    /// Clinical column holding the (optional) ground-truth target
    #[arg(long = "target_label")]
    pub target_label: String,

    /// Categorical covariate columns; must match the artifact's
    /// (omitted = use the artifact's columns)
    #[arg(long = "cat_labels")]
    pub cat_labels: Vec<String>,

    /// Continuous covariate columns; must match the artifact's
    /// (omitted = use the artifact's columns)
    #[arg(long = "cont_labels")]
    pub cont_labels: Vec<String>,

    /// Target category order; must match the artifact's
    /// (omitted = use the artifact's order)
    #[arg(long = "categories")]
    pub categories: Vec<String>,

    /// Directory of a saved model artifact (from train or crossval)
    #[arg(long = "model_path")]
    pub model_path: String,

    /// Number of bags per inference batch
    #[arg(long = "batch_size", default_value_t = 8)]
    pub batch_size: usize,

    /// Seed for backend initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// All arguments for the `roc` command
#[derive(Args, Debug)]
pub struct RocArgs {
    /// Prediction table written by train, crossval or deploy
    #[arg(long = "pred_table")]
    pub pred_table: String,

    /// Directory to write the ROC outputs into
    #[arg(long = "output_path")]
    pub output_path: String,

    /// Number of bootstrap resamples per category
    #[arg(long = "n_bootstrap", default_value_t = 1000)]
    pub n_bootstrap: usize,

    /// Seed for the bootstrap resampling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
