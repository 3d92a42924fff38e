// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence concerns shared by the use cases:
//
//   artifact.rs    — ModelArtifact store
//                    Saves model weights with Burn's
//                    CompactRecorder next to an artifact.json
//                    describing the schema the model expects
//                    (feature dim, category order, covariate
//                    encoder, architecture hyperparameters).
//                    Deployment loads both and refuses to score
//                    data that does not match the schema.
//
//   predictions.rs — Patient-level prediction table
//                    Writes/reads the canonical predictions CSV
//                    (one row per patient, one probability
//                    column per category). The statistics engine
//                    consumes this file.
//
//   metrics.rs     — Training metrics logging
//                    Appends epoch-level train/val losses to a
//                    CSV for learning-curve inspection.

/// ModelArtifact saving and loading
pub mod artifact;

/// Training metrics CSV logger
pub mod metrics;

/// Prediction table CSV reader/writer
pub mod predictions;
