// ============================================================
// Layer 3 — Feature Sequence Domain Types
// ============================================================
// The CNN turns an image of shape [h, w] into a sequence of
// feature vectors, one per column of the final feature map:
//
//   image [1 x 32 x 100]  ──CNN──▶  [25 steps x 1024 channels]
//
// A downstream sequence model (CTC / attention decoder) reads
// the steps left to right.

use serde::{Deserialize, Serialize};

/// The extracted features for one image, row-major [steps][channels].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSequence {
    pub source:   String,
    pub steps:    usize,
    pub channels: usize,
    pub values:   Vec<f32>,
}

impl FeatureSequence {
    pub fn new(source: impl Into<String>, steps: usize, channels: usize, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), steps * channels);
        Self { source: source.into(), steps, channels, values }
    }

    /// The feature vector for one step (one column of the feature map)
    pub fn row(&self, step: usize) -> &[f32] {
        &self.values[step * self.channels..(step + 1) * self.channels]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks(self.channels.max(1))
    }
}

/// Shape of the final feature map, computed without running the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGeometry {
    /// Width of the final map — the sequence length
    pub steps:    usize,
    pub channels: usize,
    /// Height of the final map. Must be 1 for a valid sequence.
    pub height:   usize,
}

impl FeatureGeometry {
    pub fn is_sequence(&self) -> bool {
        self.height == 1
    }
}

/// Output shape of one named stage of the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGeometry {
    pub name:     String,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl StageGeometry {
    pub fn new(name: impl Into<String>, channels: usize, height: usize, width: usize) -> Self {
        Self { name: name.into(), channels, height, width }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_slices_one_step() {
        let f = FeatureSequence::new("x", 3, 2, vec![0., 1., 2., 3., 4., 5.]);
        assert_eq!(f.row(1), &[2.0, 3.0]);
        assert_eq!(f.rows().count(), 3);
    }

    #[test]
    fn test_geometry_sequence_requires_unit_height() {
        let ok  = FeatureGeometry { steps: 25, channels: 512, height: 1 };
        let bad = FeatureGeometry { steps: 25, channels: 512, height: 2 };
        assert!(ok.is_sequence());
        assert!(!bad.is_sequence());
    }
}
