// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn-specific modeling code lives here (plus the batching
// half of the data layer). The CPU NdArray backend keeps runs
// reproducible; training wraps it in Autodiff for gradients.
//
//   model.rs    — attention-MIL classifier: per-tile projection,
//                 masked attention pooling, covariate concat, head
//   trainer.rs  — epoch loop with early stopping and in-memory
//                 best-epoch checkpointing
//   crossval.rs — patient-grouped stratified k-fold driver
//   deployer.rs — loads an artifact, checks schema, scores patients
//
// Reference: Ilse et al. (2018) Attention-based Deep MIL
//            Burn Book §3 (Building Blocks), §5 (Training)

use burn::prelude::*;

/// Attention-MIL classifier and its masked-softmax pooling
pub mod model;

/// Training loop: early stopping, checkpointing, numeric guards
pub mod trainer;

/// Cross-validation driver producing out-of-fold predictions
pub mod crossval;

/// Artifact deployment: schema validation + scoring
pub mod deployer;

/// Backend used during training (gradient tracking enabled).
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// Backend used for validation and inference.
pub type InferBackend = burn::backend::NdArray;

/// The modeling subsystem handle: device plus run seed, constructed
/// once per invocation and passed by reference into the Trainer,
/// Cross-Validator and Deployer.
#[derive(Debug, Clone)]
pub struct ModelingRuntime {
    pub device: <InferBackend as Backend>::Device,
    pub seed:   u64,
}

impl ModelingRuntime {
    pub fn new(seed: u64) -> Self {
        // Seed both backends so weight initialisation and any
        // backend-internal sampling are reproducible for a fixed seed.
        <TrainBackend as Backend>::seed(seed);
        <InferBackend as Backend>::seed(seed);

        let device = Default::default();
        tracing::info!("modeling runtime ready (ndarray backend, seed {seed})");
        Self { device, seed }
    }
}
