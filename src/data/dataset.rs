use burn::data::dataset::Dataset;

use crate::data::joiner::PatientSample;

/// Joined patient samples behind Burn's Dataset trait so the
/// DataLoader can call .get(index) and .len() on them.
pub struct BagDataset {
    samples: Vec<PatientSample>,
}

impl BagDataset {
    pub fn new(samples: Vec<PatientSample>) -> Self {
        Self { samples }
    }
}

impl Dataset<PatientSample> for BagDataset {
    fn get(&self, index: usize) -> Option<PatientSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
