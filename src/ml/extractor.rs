// ============================================================
// Layer 5 — Extractor
// ============================================================
// Runs the CNN over preprocessed images.
//
// Images are grouped into batches of consecutive samples that
// share one shape (at most batch_size each), so input order is
// preserved in the output even when padding is disabled.
//
// Runs on a plain (non-autodiff) backend: batch norm uses its
// running statistics and dropout is a no-op.
//
// Images are grayscale; a network built for more input channels
// receives the gray plane repeated across them.

use anyhow::{Context, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::batcher::{ImageBatch, ImageBatcher};
use crate::domain::features::FeatureSequence;
use crate::domain::image_sample::ImageSample;
use crate::domain::traits::FeatureExtractor;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{Cnn, CnnConfig};

/// Batched feature extraction with a restored network.
pub struct Extractor<B: Backend> {
    model:      Cnn<B>,
    config:     CnnConfig,
    device:     B::Device,
    batch_size: usize,
}

impl<B: Backend> Extractor<B> {
    pub fn new(model: Cnn<B>, config: CnnConfig, device: B::Device, batch_size: usize) -> Self {
        Self { model, config, device, batch_size: batch_size.max(1) }
    }

    /// Restore config and weights from `ckpt`.
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: B::Device, batch_size: usize) -> Result<Self> {
        let (config, model) = ckpt.restore::<B>(&device)?;
        Ok(Self::new(model, config, device, batch_size))
    }

    pub fn config(&self) -> &CnnConfig {
        &self.config
    }

    /// Run one batch of same-shaped images.
    ///
    /// The input size is checked against the network geometry before
    /// anything runs, so a bad size is an error rather than a panic.
    pub fn extract_batch(&self, items: Vec<ImageSample>) -> Result<Vec<FeatureSequence>> {
        let (height, width) = ImageBatcher::uniform_shape(&items)?;
        let geometry = self
            .config
            .check_input(height, width)
            .with_context(|| format!("Cannot extract features from {height}x{width} images"))?;

        let batcher = ImageBatcher::new().with_channels(self.model.input_channels());
        let batch: ImageBatch<B> = batcher.batch(items, &self.device);
        let features = self.model.forward(batch.images)?;
        let [n, steps, channels] = features.dims();
        debug_assert_eq!((steps, channels), (geometry.steps, geometry.channels));

        let values = features
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read feature tensor: {e:?}"))?;

        tracing::debug!("Extracted batch of {} ({} steps x {} channels)", n, steps, channels);

        Ok(batch
            .sources
            .into_iter()
            .zip(values.chunks(steps * channels))
            .map(|(source, chunk)| FeatureSequence::new(source, steps, channels, chunk.to_vec()))
            .collect())
    }
}

impl<B: Backend> FeatureExtractor for Extractor<B> {
    fn extract(&self, images: &[ImageSample]) -> Result<Vec<FeatureSequence>> {
        let mut out   = Vec::with_capacity(images.len());
        let mut start = 0;

        while start < images.len() {
            let shape = images[start].shape();
            let mut end = start + 1;
            while end < images.len() && end - start < self.batch_size && images[end].shape() == shape {
                end += 1;
            }
            out.extend(self.extract_batch(images[start..end].to_vec())?);
            start = end;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn tiny() -> CnnConfig {
        CnnConfig::new()
            .with_crnn_filters([2, 2, 2, 2])
            .with_head_filters(3)
            .with_conv7_filters(4)
    }

    fn extractor_for(config: CnnConfig, batch_size: usize) -> Extractor<TB> {
        let device = Default::default();
        let model  = config.init::<TB>(&device);
        Extractor::new(model, config, device, batch_size)
    }

    fn extractor(batch_size: usize) -> Extractor<TB> {
        extractor_for(tiny(), batch_size)
    }

    #[test]
    fn test_extract_preserves_order_across_shapes() {
        let ex = extractor(2);
        let images = vec![
            ImageSample::blank("a", 32, 16),
            ImageSample::blank("b", 32, 16),
            ImageSample::blank("c", 32, 16),
            ImageSample::blank("d", 32, 24),
        ];
        let out = ex.extract(&images).unwrap();

        let names: Vec<&str> = out.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!((out[0].steps, out[0].channels), (4, 4));
        assert_eq!(out[3].steps, 6);
    }

    #[test]
    fn test_identical_images_give_identical_features() {
        let ex  = extractor(8);
        let img = ImageSample::new("x", 32, 8, (0..256).map(|v| v as f32).collect());
        let out = ex.extract(&[img.clone(), img]).unwrap();
        assert_eq!(out[0].values, out[1].values);
    }

    #[test]
    fn test_rejects_images_too_tall_to_collapse() {
        let ex  = extractor(4);
        let err = ex.extract(&[ImageSample::blank("tall", 64, 16)]).unwrap_err();
        assert!(format!("{err:#}").contains("rows high"));
    }

    #[test]
    fn test_empty_input_gives_no_features() {
        assert!(extractor(4).extract(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_three_channel_network_takes_gray_images() {
        let ex  = extractor_for(tiny().with_input_channels(3), 4);
        let img = ImageSample::new("rgb", 32, 8, (0..256).map(|v| v as f32).collect());
        let out = ex.extract(&[img]).unwrap();
        assert_eq!((out[0].steps, out[0].channels), (2, 4));
        assert_eq!(out[0].values.len(), 2 * 4);
    }
}
