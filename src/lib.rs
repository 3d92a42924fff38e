// ============================================================
// stamp-mil — Attention-MIL modeling on WSI tile features
// ============================================================
// Layered architecture, one concern per layer:
//
//   Layer 1  cli/          — clap argument parsing and dispatch
//   Layer 2  application/  — one use case per subcommand
//   Layer 3  domain/       — pure data types and the error taxonomy
//   Layer 4  data/         — tables, feature files, join, batching, splits
//   Layer 5  ml/           — Burn model, trainer, cross-validator, deployer
//   Layer 5  stats/        — ROC curves, AUC, bootstrap intervals
//   Layer 6  infra/        — artifact store, prediction tables, metrics log
//
// Lower layers never import from higher ones; all Burn-specific
// code lives in ml/ and the batching half of data/.
//
// Reference: Ilse et al. (2018) Attention-based Deep MIL
//            Burn Book §4-5 (Data, Training)

#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod infra;
pub mod ml;
pub mod stats;
