// ============================================================
// Layer 4 — Feature File Reader
// ============================================================
// Reads one slide's FeatureBag from the feature directory.
// The on-disk format is owned by the upstream preprocessing
// collaborator; this core only requires deterministic retrieval
// by slide identifier and a stable vector dimensionality:
//
//   <feature_dir>/<slide_id>.json
//   {
//     "features": [[f32; D], ...],     // one row per tile
//     "coords":   [[x, y], ...]        // optional, one per tile
//   }
//
// A missing file resolves to None so the joiner can drop the
// slide with a counted warning instead of failing the run.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::bag::FeatureBag;
use crate::domain::error::{PipelineError, Result};

/// The on-disk shape of one slide's feature file.
#[derive(Debug, Deserialize)]
struct FeatureFile {
    features: Vec<Vec<f32>>,
    #[serde(default)]
    coords: Option<Vec<[f32; 2]>>,
}

/// Find the feature file for a slide, or None if it does not exist.
/// Slide ids may already carry the .json extension or not.
pub fn resolve_feature_path(feature_dir: &Path, slide_id: &str) -> Option<PathBuf> {
    let with_ext = feature_dir.join(format!("{slide_id}.json"));
    if with_ext.is_file() {
        return Some(with_ext);
    }
    let as_given = feature_dir.join(slide_id);
    as_given.is_file().then_some(as_given)
}

/// Load one slide's FeatureBag, validating uniform dimensionality.
pub fn load_feature_bag(path: &Path, slide_id: &str) -> Result<FeatureBag> {
    let raw = fs::read_to_string(path)
        .map_err(|e| PipelineError::io(path.display().to_string(), e))?;

    let file: FeatureFile = serde_json::from_str(&raw).map_err(|e| {
        PipelineError::Data(format!(
            "feature file '{}' for slide '{slide_id}' is malformed: {e}",
            path.display()
        ))
    })?;

    FeatureBag::from_rows(file.features, file.coords, slide_id)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_feature_bag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.json");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(br#"{"features": [[1.0, 2.0], [3.0, 4.0]], "coords": [[0, 0], [0, 224]]}"#)
            .unwrap();

        let bag = load_feature_bag(&path, "s1").unwrap();
        assert_eq!(bag.n_tiles, 2);
        assert_eq!(bag.dim, 2);
        assert_eq!(bag.coords.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_coords_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.json");
        fs::write(&path, r#"{"features": [[1.0]]}"#).unwrap();

        let bag = load_feature_bag(&path, "s1").unwrap();
        assert!(bag.coords.is_none());
    }

    #[test]
    fn test_resolve_with_and_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("s1.json"), "{}").unwrap();

        assert!(resolve_feature_path(dir.path(), "s1").is_some());
        assert!(resolve_feature_path(dir.path(), "s1.json").is_some());
        assert!(resolve_feature_path(dir.path(), "missing").is_none());
    }

    #[test]
    fn test_malformed_file_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.json");
        fs::write(&path, "not json").unwrap();

        let err = load_feature_bag(&path, "s1").unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }
}
