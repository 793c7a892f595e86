// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the CNN.
//
// File layout:
//   checkpoints/
//     cnn_config.json   ← CnnConfig (architecture)
//     model.mpk         ← all weights, CheckpointRecorder
//
// CheckpointRecorder is Burn's named MessagePack file recorder
// with full precision settings:
//   - Stores every weight as f32, so a pretrained backbone
//     survives a save/load cycle bit for bit
//   - Type-safe: loading fails if the architecture doesn't match
//   - The recorder appends its own extension to the path it is given
//
// Pretrained ResNet weights are a record of the ResNetStage
// module alone (same recorder, any path). They are loaded into
// the stage of an already built network.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{FileRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::domain::features::FeatureSequence;
use crate::ml::model::{Cnn, CnnConfig};

/// Recorder used for checkpoints and pretrained backbones.
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

const CONFIG_FILE: &str = "cnn_config.json";
const MODEL_FILE:  &str = "model";

/// Manages saving and loading of the network checkpoint.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    /// Directory holding the config and the weights
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager rooted at `dir`.
    /// The directory is only created on the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the weights file, with the extension the recorder writes.
    pub fn model_path<B: Backend>(&self) -> PathBuf {
        self.dir
            .join(MODEL_FILE)
            .with_extension(<CheckpointRecorder as FileRecorder<B>>::file_extension())
    }

    /// True once both the config and the weights have been written.
    pub fn exists<B: Backend>(&self) -> bool {
        self.dir.join(CONFIG_FILE).exists() && self.model_path::<B>().exists()
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))
    }

    /// Save the architecture as pretty JSON to {dir}/cnn_config.json.
    ///
    /// The config is all `restore` needs to rebuild a network whose
    /// record layout matches the saved weights.
    pub fn save_config(&self, cfg: &CnnConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved network config to '{}'", path.display());
        Ok(())
    }

    /// Read the architecture saved by `save_config`.
    /// A missing file points the user at `init`.
    pub fn load_config(&self) -> Result<CnnConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'init' first.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed network config '{}'", path.display()))
    }

    /// Save all network weights.
    ///
    /// Uses CheckpointRecorder which:
    ///   1. Calls model.into_record() to extract all parameters
    ///   2. Serialises them to named MessagePack at full precision
    ///   3. Writes to {dir}/model.mpk
    pub fn save_model<B: Backend>(&self, model: &Cnn<B>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(MODEL_FILE);
        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;
        tracing::debug!("Saved weights to '{}'", self.model_path::<B>().display());
        Ok(())
    }

    /// Load saved weights into a network built from the saved config.
    ///
    /// The model parameter must have the architecture the weights were
    /// saved from; the frozen stage is re-frozen after loading.
    pub fn load_model<B: Backend>(&self, model: Cnn<B>, device: &B::Device) -> Result<Cnn<B>> {
        let path   = self.dir.join(MODEL_FILE);
        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load weights '{}'. Have you run 'init' first?", path.display())
            })?;
        Ok(model.load_record(record).freeze_backbone())
    }

    /// Build the network described by the saved config and load its weights.
    pub fn restore<B: Backend>(&self, device: &B::Device) -> Result<(CnnConfig, Cnn<B>)> {
        let cfg   = self.load_config()?;
        cfg.validate()?;
        let model = self.load_model(cfg.init(device), device)?;
        tracing::info!("Network restored from '{}'", self.dir.display());
        Ok((cfg, model))
    }

    /// Load a pretrained ResNet-stage record into the network's stage.
    ///
    /// `path` is given without extension; the recorder appends `.mpk`.
    /// Fails when the network was built with the CRNN stem.
    pub fn load_backbone<B: Backend>(
        &self,
        mut model: Cnn<B>,
        path:      impl AsRef<Path>,
        device:    &B::Device,
    ) -> Result<Cnn<B>> {
        let path = path.as_ref().to_path_buf();
        let Some(stage) = model.resnet.take() else {
            bail!("network has no resnet stem; pretrained weights '{}' do not apply", path.display());
        };
        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load pretrained backbone '{}'", path.display()))?;
        model.resnet = Some(stage.load_record(record));
        tracing::info!("Pretrained backbone loaded from '{}'", path.display());
        Ok(model.freeze_backbone())
    }

    /// Write extracted features as pretty JSON.
    /// Missing parent directories are created.
    pub fn save_features(path: impl AsRef<Path>, features: &[FeatureSequence]) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(features)?;
        fs::write(path, json).with_context(|| format!("Cannot write features to '{}'", path.display()))?;
        tracing::info!("Wrote {} feature sequences to '{}'", features.len(), path.display());
        Ok(())
    }
}
