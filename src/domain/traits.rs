// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// By programming against traits instead of concrete types,
// the application layer can swap implementations without
// changing the code that uses them:
//   - ImageLoader implements ImageSource (files on disk)
//   - Vec<ImageSample> is an in-memory source, fed to
//     ExtractUseCase::execute_on
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::features::FeatureSequence;
use crate::domain::image_sample::ImageSample;

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Any component that can produce preprocessed images.
pub trait ImageSource {
    fn load_all(&self) -> Result<Vec<ImageSample>>;
}

/// Samples that are already preprocessed.
impl ImageSource for Vec<ImageSample> {
    fn load_all(&self) -> Result<Vec<ImageSample>> {
        Ok(self.clone())
    }
}

// ─── FeatureExtractor ─────────────────────────────────────────────────────────
/// Any component that turns images into feature sequences.
///
/// Implementations:
///   - Extractor → runs the CNN on a Burn backend
pub trait FeatureExtractor {
    fn extract(&self, images: &[ImageSample]) -> Result<Vec<FeatureSequence>>;
}
