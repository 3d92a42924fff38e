// ============================================================
// Layer 6 — Model Artifact Store
// ============================================================
// A trained model on disk is two files in one directory:
//
//   artifact/
//     model.mpk.gz    ← weights via Burn's CompactRecorder
//     artifact.json   ← everything needed to rebuild and reuse it
//
// artifact.json carries the model architecture (so inference can
// reconstruct the exact module tree before loading weights) AND the
// data schema the model was fitted on (feature dimensionality,
// target category order, fitted covariate encoder). Deployment
// validates new data against that schema before any inference runs.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::fs;
use std::path::PathBuf;

use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use serde::{Deserialize, Serialize};

use crate::data::covariates::CovariateEncoder;
use crate::data::joiner::JoinedDataset;
use crate::domain::error::{PipelineError, Result};
use crate::ml::model::{AttentionMilConfig, AttentionMilModel};
use crate::ml::InferBackend;

/// Everything about a trained model except its weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Tile-feature dimensionality the model was fitted on
    pub feature_dim: usize,

    /// Ordered target categories; position i is class index i and
    /// output probability column i
    pub categories: Vec<String>,

    /// Fitted covariate vocabularies and continuous column names
    pub encoder: CovariateEncoder,

    // Architecture hyperparameters, needed to rebuild the module
    // tree before the weights can be loaded into it
    pub d_model: usize,
    pub d_attn:  usize,
    pub dropout: f64,
}

impl ArtifactMeta {
    /// Rebuild the (unweighted) model this artifact describes.
    pub fn model_config(&self) -> AttentionMilConfig {
        AttentionMilConfig::new(
            self.feature_dim,
            self.categories.len(),
            self.encoder.encoded_dim(),
            self.d_model,
            self.d_attn,
            self.dropout,
        )
    }

    /// Check a joined dataset against the schema this model was
    /// fitted on. Any mismatch is fatal and names the field.
    pub fn validate_schema(&self, joined: &JoinedDataset) -> Result<()> {
        if joined.feature_dim != self.feature_dim {
            return Err(PipelineError::Schema {
                field:    "feature_dim".into(),
                expected: self.feature_dim.to_string(),
                found:    joined.feature_dim.to_string(),
            });
        }
        if joined.categories != self.categories {
            return Err(PipelineError::Schema {
                field:    "categories".into(),
                expected: format!("{:?}", self.categories),
                found:    format!("{:?}", joined.categories),
            });
        }
        if joined.encoder != self.encoder {
            let names = |e: &CovariateEncoder| {
                let cat: Vec<&str> = e.cat.iter().map(|v| v.name.as_str()).collect();
                let cont: Vec<&str> = e.cont.iter().map(String::as_str).collect();
                format!("categorical {cat:?}, continuous {cont:?}")
            };
            return Err(PipelineError::Schema {
                field:    "covariates".into(),
                expected: names(&self.encoder),
                found:    names(&joined.encoder),
            });
        }
        Ok(())
    }
}

/// Saves and loads model artifacts in one directory.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Write weights and artifact.json. Creates the directory.
    pub fn save(&self, model: &AttentionMilModel<InferBackend>, meta: &ArtifactMeta) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::io(self.dir.display().to_string(), e))?;

        // Weights first — recorder adds the .mpk.gz extension
        let weights = self.dir.join("model");
        CompactRecorder::new()
            .record(model.clone().into_record(), weights.clone())
            .map_err(|e| {
                PipelineError::Data(format!(
                    "cannot save model weights to '{}': {e}",
                    weights.display()
                ))
            })?;

        let meta_path = self.dir.join("artifact.json");
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&meta_path, json)
            .map_err(|e| PipelineError::io(meta_path.display().to_string(), e))?;

        tracing::info!("saved model artifact to '{}'", self.dir.display());
        Ok(())
    }

    /// Load artifact.json, rebuild the model, restore the weights.
    pub fn load(
        &self,
        device: &<InferBackend as Backend>::Device,
    ) -> Result<(AttentionMilModel<InferBackend>, ArtifactMeta)> {
        let meta_path = self.dir.join("artifact.json");
        let json = fs::read_to_string(&meta_path)
            .map_err(|e| PipelineError::io(meta_path.display().to_string(), e))?;
        let meta: ArtifactMeta = serde_json::from_str(&json)?;

        let weights = self.dir.join("model");
        let record = CompactRecorder::new().load(weights.clone(), device).map_err(|e| {
            PipelineError::Data(format!(
                "cannot load model weights from '{}': {e}",
                weights.display()
            ))
        })?;

        let model = meta.model_config().init(device).load_record(record);
        Ok((model, meta))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::covariates::CovariateVocab;
    use crate::data::joiner::JoinDiagnostics;
    use crate::ml::ModelingRuntime;

    fn meta() -> ArtifactMeta {
        ArtifactMeta {
            feature_dim: 4,
            categories:  vec!["neg".into(), "pos".into()],
            encoder:     CovariateEncoder {
                cat:  vec![CovariateVocab {
                    name:   "SEX".into(),
                    values: vec!["F".into(), "M".into()],
                }],
                cont: vec!["AGE".into()],
            },
            d_model: 8,
            d_attn:  4,
            dropout: 0.0,
        }
    }

    fn joined(feature_dim: usize, meta: &ArtifactMeta) -> JoinedDataset {
        JoinedDataset {
            samples:     vec![],
            feature_dim,
            categories:  meta.categories.clone(),
            encoder:     meta.encoder.clone(),
            diagnostics: JoinDiagnostics::default(),
        }
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let runtime = ModelingRuntime::new(5);
        let meta = meta();
        let model: AttentionMilModel<InferBackend> =
            meta.model_config().init(&runtime.device);

        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("artifact"));
        store.save(&model, &meta).unwrap();

        let (_, loaded_meta) = store.load(&runtime.device).unwrap();
        assert_eq!(loaded_meta.feature_dim, 4);
        assert_eq!(loaded_meta.categories, meta.categories);
        assert_eq!(loaded_meta.encoder, meta.encoder);
    }

    #[test]
    fn test_schema_mismatch_names_the_field() {
        let meta = meta();

        let err = meta.validate_schema(&joined(7, &meta)).unwrap_err();
        match err {
            PipelineError::Schema { field, expected, found } => {
                assert_eq!(field, "feature_dim");
                assert_eq!(expected, "4");
                assert_eq!(found, "7");
            }
            other => panic!("expected schema error, got {other:?}"),
        }

        let mut bad_cats = joined(4, &meta);
        bad_cats.categories = vec!["a".into(), "b".into()];
        assert!(matches!(
            meta.validate_schema(&bad_cats),
            Err(PipelineError::Schema { field, .. }) if field == "categories"
        ));

        let mut bad_cov = joined(4, &meta);
        bad_cov.encoder.cont.clear();
        assert!(matches!(
            meta.validate_schema(&bad_cov),
            Err(PipelineError::Schema { field, .. }) if field == "covariates"
        ));
    }

    #[test]
    fn test_matching_schema_passes() {
        let meta = meta();
        assert!(meta.validate_schema(&joined(4, &meta)).is_ok());
    }

    #[test]
    fn test_load_missing_artifact_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("nothing_here"));
        let runtime = ModelingRuntime::new(1);
        assert!(matches!(
            store.load(&runtime.device),
            Err(PipelineError::Io { .. })
        ));
    }
}
