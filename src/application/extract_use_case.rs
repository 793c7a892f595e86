// ============================================================
// Layer 2 — ExtractUseCase
// ============================================================
//   Step 1: Load + preprocess images   (Layer 4 - data)
//   Step 2: Restore the network        (Layer 6 - infra)
//   Step 3: Run batched inference      (Layer 5 - ml)
//   Step 4: Write features to JSON     (Layer 6 - infra)

use anyhow::{ensure, Result};
use burn::{data::dataset::Dataset, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::{dataset::ImageDataset, loader::ImageLoader, preprocessor::Preprocessor};
use crate::domain::features::FeatureSequence;
use crate::domain::traits::{FeatureExtractor, ImageSource};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::extractor::Extractor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub checkpoint_dir: String,
    /// An image file or a directory of images
    pub input:          String,
    /// Where to write the features JSON; skipped when None
    pub output:         Option<String>,
    pub height:         usize,
    pub max_width:      usize,
    pub pad:            bool,
    pub batch_size:     usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "checkpoints".to_string(),
            input:          "images".to_string(),
            output:         None,
            height:         32,
            max_width:      256,
            pad:            true,
            batch_size:     16,
        }
    }
}

impl ExtractConfig {
    /// Catch sizes that would only fail deep inside preprocessing or
    /// the network.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.height > 0, "--height must be at least 1");
        ensure!(self.max_width > 0, "--max-width must be at least 1");
        ensure!(self.batch_size > 0, "--batch-size must be at least 1");
        Ok(())
    }
}

pub struct ExtractUseCase {
    config: ExtractConfig,
}

impl ExtractUseCase {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Load and preprocess the images under `input`, then extract.
    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<Vec<FeatureSequence>> {
        let cfg = &self.config;
        cfg.validate()?;

        let preprocessor = Preprocessor::new(cfg.height, cfg.max_width).with_pad(cfg.pad);
        self.execute_on::<B>(&ImageLoader::new(&cfg.input, preprocessor), device)
    }

    /// Extract features from any source of already preprocessed images.
    pub fn execute_on<B: Backend>(
        &self,
        source: &impl ImageSource,
        device: B::Device,
    ) -> Result<Vec<FeatureSequence>> {
        let cfg     = &self.config;
        let dataset = ImageDataset::new(source.load_all()?);
        if dataset.is_empty() {
            tracing::warn!("No images found in '{}'", cfg.input);
            return Ok(Vec::new());
        }

        let ckpt      = CheckpointManager::new(&cfg.checkpoint_dir);
        let extractor = Extractor::<B>::from_checkpoint(&ckpt, device, cfg.batch_size)?;
        let features  = extractor.extract(dataset.samples())?;
        tracing::info!("Extracted features for {} images", features.len());

        if let Some(output) = &cfg.output {
            CheckpointManager::save_features(output, &features)?;
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{GrayImage, Luma};

    use crate::application::init_use_case::{InitConfig, InitUseCase};
    use crate::domain::image_sample::ImageSample;
    use crate::ml::model::CnnConfig;

    fn init_checkpoint(dir: &std::path::Path, network: CnnConfig) {
        InitUseCase::new(InitConfig {
            checkpoint_dir: dir.to_string_lossy().into_owned(),
            network,
            ..InitConfig::default()
        })
        .execute::<NdArray>(&Default::default())
        .unwrap();
    }

    #[test]
    fn test_extract_end_to_end() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = dir.path().join("ckpt");
        let images = dir.path().join("images");
        std::fs::create_dir_all(&images).unwrap();
        GrayImage::from_pixel(40, 20, Luma([10])).save(images.join("one.png")).unwrap();
        GrayImage::from_pixel(20, 20, Luma([200])).save(images.join("two.png")).unwrap();

        init_checkpoint(
            &ckpt,
            CnnConfig::new()
                .with_crnn_filters([2, 2, 2, 2])
                .with_head_filters(2)
                .with_conv7_filters(3),
        );

        let output = dir.path().join("features.json");
        let cfg = ExtractConfig {
            checkpoint_dir: ckpt.to_string_lossy().into_owned(),
            input:          images.to_string_lossy().into_owned(),
            output:         Some(output.to_string_lossy().into_owned()),
            max_width:      64,
            ..ExtractConfig::default()
        };
        let features = ExtractUseCase::new(cfg).execute::<NdArray>(Default::default()).unwrap();

        assert_eq!(features.len(), 2);
        // padded to 64 columns → 16 steps each
        assert!(features.iter().all(|f| f.steps == 16 && f.channels == 3));
        assert!(output.exists());
    }

    #[test]
    fn test_no_images_skips_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ExtractConfig {
            checkpoint_dir: dir.path().join("missing").to_string_lossy().into_owned(),
            input:          dir.path().to_string_lossy().into_owned(),
            ..ExtractConfig::default()
        };
        let out = ExtractUseCase::new(cfg).execute::<NdArray>(Default::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_in_memory_source_on_three_channel_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        init_checkpoint(
            dir.path(),
            CnnConfig::new()
                .with_input_channels(3)
                .with_crnn_filters([2, 2, 2, 2])
                .with_head_filters(2)
                .with_conv7_filters(3),
        );

        let images = vec![ImageSample::blank("a", 32, 16), ImageSample::blank("b", 32, 16)];
        let cfg = ExtractConfig {
            checkpoint_dir: dir.path().to_string_lossy().into_owned(),
            ..ExtractConfig::default()
        };
        let features = ExtractUseCase::new(cfg).execute_on::<NdArray>(&images, Default::default()).unwrap();

        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| f.steps == 4 && f.channels == 3));
    }

    #[test]
    fn test_zero_height_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ExtractConfig {
            input:  dir.path().to_string_lossy().into_owned(),
            height: 0,
            ..ExtractConfig::default()
        };
        let err = ExtractUseCase::new(cfg).execute::<NdArray>(Default::default()).unwrap_err();
        assert!(err.to_string().contains("--height"));
    }
}
