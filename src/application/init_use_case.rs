// ============================================================
// Layer 2 — InitUseCase
// ============================================================
// Creates a ready-to-use checkpoint:
//
//   Step 1: Validate the network config       (Layer 5 - ml)
//   Step 2: Build the network                 (Layer 5 - ml)
//   Step 3: Load pretrained ResNet weights    (Layer 6 - infra)
//   Step 4: Save config + weights             (Layer 6 - infra)

use anyhow::{bail, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::CnnConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    pub checkpoint_dir:   String,
    pub network:          CnnConfig,
    /// Burn record of a pretrained ResNet stage
    pub backbone_weights: Option<String>,
    /// Replace an existing checkpoint
    pub overwrite:        bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir:   "checkpoints".to_string(),
            network:          CnnConfig::new(),
            backbone_weights: None,
            overwrite:        false,
        }
    }
}

/// What was written, for the CLI to report.
#[derive(Debug, Clone)]
pub struct InitSummary {
    pub total_params:     usize,
    pub trainable_params: usize,
    pub pretrained:       bool,
}

pub struct InitUseCase {
    config: InitConfig,
}

impl InitUseCase {
    pub fn new(config: InitConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<InitSummary> {
        let cfg  = &self.config;
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);

        if ckpt.exists::<B>() && !cfg.overwrite {
            bail!(
                "a checkpoint already exists in '{}'; pass --overwrite to replace it",
                cfg.checkpoint_dir
            );
        }

        cfg.network.validate()?;
        let mut model = cfg.network.init::<B>(device);
        tracing::info!(
            "Network built: stem={:?}, residual={}, {} parameters",
            cfg.network.stem,
            cfg.network.residual.is_some(),
            model.num_params()
        );

        if let Some(weights) = &cfg.backbone_weights {
            model = ckpt.load_backbone(model, weights, device)?;
        }

        ckpt.save_config(&cfg.network)?;
        ckpt.save_model(&model)?;
        tracing::info!("Checkpoint written to '{}'", cfg.checkpoint_dir);

        Ok(InitSummary {
            total_params:     model.num_params(),
            trainable_params: model.num_trainable_params(),
            pretrained:       cfg.backbone_weights.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn small_config(dir: &std::path::Path) -> InitConfig {
        InitConfig {
            checkpoint_dir: dir.to_string_lossy().into_owned(),
            network: CnnConfig::new()
                .with_crnn_filters([2, 2, 2, 2])
                .with_head_filters(2)
                .with_conv7_filters(2),
            ..InitConfig::default()
        }
    }

    #[test]
    fn test_init_writes_checkpoint() {
        let dir     = tempfile::tempdir().unwrap();
        let summary = InitUseCase::new(small_config(dir.path()))
            .execute::<NdArray>(&Default::default())
            .unwrap();
        assert!(CheckpointManager::new(dir.path()).exists::<NdArray>());
        assert_eq!(summary.total_params, summary.trainable_params);
        assert!(!summary.pretrained);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        InitUseCase::new(small_config(dir.path())).execute::<NdArray>(&device).unwrap();

        let again = InitUseCase::new(small_config(dir.path())).execute::<NdArray>(&device);
        assert!(format!("{:#}", again.unwrap_err()).contains("--overwrite"));

        let mut cfg = small_config(dir.path());
        cfg.overwrite = true;
        assert!(InitUseCase::new(cfg).execute::<NdArray>(&device).is_ok());
    }

    #[test]
    fn test_init_rejects_invalid_network() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = small_config(dir.path());
        cfg.network = cfg.network.with_keep_prob(1.5);
        assert!(InitUseCase::new(cfg).execute::<NdArray>(&Default::default()).is_err());
        assert!(!CheckpointManager::new(dir.path()).exists::<NdArray>());
    }
}
