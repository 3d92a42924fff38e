// ============================================================
// Layer 5 — Statistics Engine
// ============================================================
// Consumes a PredictionRecord table and computes ROC curves, AUC,
// and bootstrap confidence intervals. Binary targets produce one
// curve; multiclass targets produce one curve per category in
// one-vs-rest mode.
//
// Degenerate-input policy: a class with zero positive or zero
// negative examples reports its AUC as undefined — never a crash,
// never silently zero — and is excluded from macro averages with a
// diagnostic note.

/// Bootstrap resampling for AUC confidence intervals
pub mod bootstrap;

/// ROC curve points and AUC computation
pub mod roc;
