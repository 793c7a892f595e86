// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack preprocessed images
// into one tensor:
//
//   Input:  N ImageSamples, each [h, w]
//   Output: ImageBatch with images of shape [N, C, h, w]
//
// C is 1 unless the network was built for more input channels;
// the grayscale plane is then repeated C times, the same way a
// gray image is shown to an RGB network.
//
// All samples in a batch must share one (h, w). The
// preprocessor's padding makes that true for a whole corpus;
// `uniform_shape` lets callers check before batching.
//
// Reference: Burn Book §4 (Batcher)

use anyhow::{ensure, Result};
use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::image_sample::ImageSample;

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// [batch, channels, h, w], raw 0..=255 intensities
    pub images:  Tensor<B, 4>,
    /// File names, in batch order
    pub sources: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher {
    channels: usize,
}

impl ImageBatcher {
    pub fn new() -> Self {
        Self { channels: 1 }
    }

    /// Repeat the grayscale plane to fill `channels` input channels.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The shared (height, width) of `items`, or an error naming the odd one out.
    pub fn uniform_shape(items: &[ImageSample]) -> Result<(usize, usize)> {
        ensure!(!items.is_empty(), "cannot batch zero images");
        let shape = items[0].shape();
        for item in items {
            ensure!(
                item.shape() == shape,
                "image '{}' is {}x{}, batch expects {}x{}; enable padding to batch mixed widths",
                item.source,
                item.height,
                item.width,
                shape.0,
                shape.1
            );
        }
        Ok(shape)
    }
}

impl Default for ImageBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Batcher<B, ImageSample, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageSample>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let (height, width) = items
            .first()
            .map(|s| s.shape())
            .unwrap_or((0, 0));

        // [s1_p1 .. s1_pHW, s2_p1 .. sN_pHW] → [N, 1, H, W]
        let flat: Vec<f32> = items
            .iter()
            .flat_map(|s| {
                assert_eq!(s.shape(), (height, width), "mixed image shapes in one batch");
                s.pixels.iter().copied()
            })
            .collect();

        let gray = Tensor::<B, 4>::from_data(
            TensorData::new(flat, [batch_size, 1, height, width]),
            device,
        );
        let images = if self.channels == 1 {
            gray
        } else {
            Tensor::cat(vec![gray; self.channels], 1)
        };
        let sources = items.into_iter().map(|s| s.source).collect();

        ImageBatch { images, sources }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_stacks_samples() {
        let items = vec![
            ImageSample::new("a", 1, 2, vec![1.0, 2.0]),
            ImageSample::new("b", 1, 2, vec![3.0, 4.0]),
        ];
        let batch: ImageBatch<NdArray> = ImageBatcher::new().batch(items, &Default::default());
        assert_eq!(batch.images.dims(), [2, 1, 1, 2]);
        assert_eq!(batch.sources, vec!["a", "b"]);
        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_batch_repeats_gray_plane_per_channel() {
        let items = vec![
            ImageSample::new("a", 1, 2, vec![1.0, 2.0]),
            ImageSample::new("b", 1, 2, vec![3.0, 4.0]),
        ];
        let batcher = ImageBatcher::new().with_channels(3);
        let batch: ImageBatch<NdArray> = batcher.batch(items, &Default::default());
        assert_eq!(batch.images.dims(), [2, 3, 1, 2]);
        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]);
    }

    #[test]
    fn test_uniform_shape_rejects_mixed_widths() {
        let items = vec![ImageSample::blank("a", 32, 10), ImageSample::blank("b", 32, 12)];
        let err   = ImageBatcher::uniform_shape(&items).unwrap_err();
        assert!(err.to_string().contains("'b'"));
        assert!(ImageBatcher::uniform_shape(&[]).is_err());
    }
}
