// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from on-disk tables and feature files to
// tensor-ready batches flows through this layer, in order:
//
//   clinical CSV + slide CSV
//       │
//       ▼
//   tables      → typed ClinicalRecord / SlideIndexEntry rows
//       │
//       ▼
//   features    → per-slide FeatureBag files
//       │
//       ▼
//   joiner      → PatientBags with labels and covariates
//       │            (covariates encoded via covariates::CovariateEncoder)
//       ▼
//   dataset     → implements Burn's Dataset trait
//       │
//       ▼
//   batcher     → pads, masks, optionally subsamples → tensor batches
//       │
//       ▼
//   DataLoader  → feeds batches to the training loop
//
// splitter sits beside this flow and carves patient-grouped
// train/validation slices and stratified k-fold partitions.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Encodes categorical/continuous covariates into numeric vectors
pub mod covariates;

/// Implements Burn's Dataset trait over joined patient samples
pub mod dataset;

/// Implements Burn's Batcher trait: padding, masking, bag capping
pub mod batcher;

/// Reads per-slide feature files from the feature directory
pub mod features;

/// Joins clinical table + slide index + feature files into PatientBags
pub mod joiner;

/// Patient-grouped train/validation and stratified k-fold splits
pub mod splitter;

/// Loads the clinical table and slide index CSVs
pub mod tables;
