// ============================================================
// Layer 3 — Feature Bags
// ============================================================
// A FeatureBag is one slide's per-tile feature matrix, stored as
// a contiguous row-major buffer plus its tile count and the fixed
// feature dimensionality. A PatientBag concatenates all of one
// patient's slides — in MIL the label belongs to the whole bag,
// never to an individual tile.
//
// Invariants enforced here:
//   - every tile vector in a bag has the same dimensionality
//   - PatientBag length = sum of its slides' tile counts
//
// Reference: Ilse et al. (2018) Attention-based Deep MIL

use crate::domain::error::{PipelineError, Result};

/// The per-tile feature matrix for one slide.
#[derive(Debug, Clone)]
pub struct FeatureBag {
    /// Row-major tile features, length = n_tiles * dim
    pub data: Vec<f32>,

    /// Number of tile vectors in this bag
    pub n_tiles: usize,

    /// Fixed feature dimensionality (same across the dataset)
    pub dim: usize,

    /// Optional tile spatial coordinates, one (x, y) per tile
    pub coords: Option<Vec<[f32; 2]>>,
}

impl FeatureBag {
    /// Build a bag from per-tile rows, validating that every row has
    /// the same dimensionality. `source` names the slide for errors.
    pub fn from_rows(
        rows:   Vec<Vec<f32>>,
        coords: Option<Vec<[f32; 2]>>,
        source: &str,
    ) -> Result<Self> {
        let n_tiles = rows.len();
        let dim     = rows.first().map(|r| r.len()).unwrap_or(0);

        let mut data = Vec::with_capacity(n_tiles * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(PipelineError::Data(format!(
                    "slide '{source}': tile {i} has {} features, expected {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(&row);
        }

        if let Some(c) = &coords {
            if c.len() != n_tiles {
                return Err(PipelineError::Data(format!(
                    "slide '{source}': {} coordinates for {n_tiles} tiles",
                    c.len()
                )));
            }
        }

        Ok(Self { data, n_tiles, dim, coords })
    }

    pub fn is_empty(&self) -> bool {
        self.n_tiles == 0
    }
}

/// All of one patient's slides concatenated into a single bag.
/// This is the training unit — one label per PatientBag.
#[derive(Debug, Clone)]
pub struct PatientBag {
    pub patient_id: String,

    /// Row-major tile features across all slides, length = n_tiles * dim
    pub data: Vec<f32>,

    pub n_tiles: usize,
    pub dim:     usize,
}

impl PatientBag {
    pub fn new(patient_id: impl Into<String>, dim: usize) -> Self {
        Self {
            patient_id: patient_id.into(),
            data:       Vec::new(),
            n_tiles:    0,
            dim,
        }
    }

    /// Append one slide's bag. Fails if dimensionalities disagree —
    /// feature dimensionality is fixed across the whole dataset.
    pub fn push_slide(&mut self, bag: &FeatureBag) -> Result<()> {
        if bag.is_empty() {
            return Ok(());
        }
        if self.n_tiles == 0 && self.data.is_empty() {
            self.dim = bag.dim;
        }
        if bag.dim != self.dim {
            return Err(PipelineError::Data(format!(
                "patient '{}': slide has dimensionality {}, expected {}",
                self.patient_id, bag.dim, self.dim
            )));
        }
        self.data.extend_from_slice(&bag.data);
        self.n_tiles += bag.n_tiles;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.n_tiles == 0
    }

    /// Borrow tile `i` as a feature slice.
    pub fn tile(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_uniform_dim() {
        let bag = FeatureBag::from_rows(
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            None,
            "s1",
        )
        .unwrap();
        assert_eq!(bag.n_tiles, 2);
        assert_eq!(bag.dim, 2);
        assert_eq!(bag.data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_from_rows_ragged_is_data_error() {
        let err = FeatureBag::from_rows(
            vec![vec![1.0, 2.0], vec![3.0]],
            None,
            "s1",
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Data(_)));
    }

    #[test]
    fn test_patient_bag_concatenates_slides() {
        let a = FeatureBag::from_rows(vec![vec![1.0, 2.0]], None, "a").unwrap();
        let b = FeatureBag::from_rows(vec![vec![3.0, 4.0], vec![5.0, 6.0]], None, "b").unwrap();

        let mut pb = PatientBag::new("p1", 2);
        pb.push_slide(&a).unwrap();
        pb.push_slide(&b).unwrap();

        // PatientBag length = sum of its slides' tile counts
        assert_eq!(pb.n_tiles, 3);
        assert_eq!(pb.tile(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_patient_bag_rejects_dim_mismatch() {
        let a = FeatureBag::from_rows(vec![vec![1.0, 2.0]], None, "a").unwrap();
        let b = FeatureBag::from_rows(vec![vec![1.0, 2.0, 3.0]], None, "b").unwrap();

        let mut pb = PatientBag::new("p1", 2);
        pb.push_slide(&a).unwrap();
        assert!(pb.push_slide(&b).is_err());
    }
}
