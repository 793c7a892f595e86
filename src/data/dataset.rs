use burn::data::dataset::Dataset;

use crate::domain::image_sample::ImageSample;

pub struct ImageDataset {
    samples: Vec<ImageSample>,
}

impl ImageDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self { Self { samples } }

    pub fn samples(&self) -> &[ImageSample] { &self.samples }
}

impl Dataset<ImageSample> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_indexing() {
        let ds = ImageDataset::new(vec![
            ImageSample::blank("a", 2, 2),
            ImageSample::blank("b", 2, 2),
        ]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().source, "b");
        assert!(ds.get(2).is_none());
    }
}
