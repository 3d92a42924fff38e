// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types that define the core concepts of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain structs, enums, and the error taxonomy
//
// The domain types mirror the pipeline's data model:
//   ClinicalRecord   — one patient row from the clinical table
//   SlideIndexEntry  — slide id → patient id mapping
//   FeatureBag       — one slide's tile feature matrix
//   PatientBag       — all of one patient's slides concatenated
//   PredictionRecord — one patient's predicted class probabilities
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Tile feature bags — the modeling unit
pub mod bag;

// The error taxonomy shared by all layers
pub mod error;

// Tabular records: clinical rows, slide index, predictions
pub mod records;
