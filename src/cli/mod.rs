// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `train`    — fit one model on every labeled patient
//   2. `crossval` — k-fold cross-validation
//   3. `deploy`   — score a new cohort with a saved artifact
//   4. `roc`      — ROC statistics for a prediction table

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, CrossvalArgs, DeployArgs, RocArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "stamp-mil",
    version,
    about = "Attention-based multiple-instance learning on whole-slide tile features."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Crossval(args) => run_crossval(args),
            Commands::Deploy(args)   => run_deploy(args),
            Commands::Roc(args)      => run_roc(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let output_path = args.data.output_path.clone();
    TrainUseCase::new(args.data.into(), args.fit.into()).execute()?;

    println!("Training complete. Outputs written to '{output_path}'.");
    Ok(())
}

fn run_crossval(args: CrossvalArgs) -> Result<()> {
    use crate::application::crossval_use_case::CrossvalUseCase;

    let output_path = args.data.output_path.clone();
    CrossvalUseCase::new(args.data.into(), args.fit.into(), args.n_splits).execute()?;

    println!("Cross-validation complete. Outputs written to '{output_path}'.");
    Ok(())
}

fn run_deploy(args: DeployArgs) -> Result<()> {
    use crate::application::deploy_use_case::DeployUseCase;
    use crate::application::DataConfig;

    let data = DataConfig {
        clini_table:  args.clini_table,
        slide_csv:    args.slide_csv,
        feature_dir:  args.feature_dir,
        output_path:  args.output_path.clone(),
        target_label: args.target_label,
        cat_labels:   args.cat_labels,
        cont_labels:  args.cont_labels,
        categories:   (!args.categories.is_empty()).then_some(args.categories),
    };
    DeployUseCase::new(data, args.model_path, args.batch_size, args.seed).execute()?;

    println!("Deployment complete. Predictions written to '{}'.", args.output_path);
    Ok(())
}

fn run_roc(args: RocArgs) -> Result<()> {
    use crate::application::roc_use_case::RocUseCase;

    let output_path = args.output_path.clone();
    RocUseCase::new(args.pred_table, args.output_path, args.n_bootstrap, args.seed).execute()?;

    println!("ROC analysis complete. Outputs written to '{output_path}'.");
    Ok(())
}
