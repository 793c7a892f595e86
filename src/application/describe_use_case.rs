// ============================================================
// Layer 2 — DescribeUseCase
// ============================================================
// Reports what the network does to an input of a given size
// without running it: the shape after every stage, the final
// feature geometry, and parameter counts.

use anyhow::Result;
use burn::prelude::*;
use std::fmt;

use crate::domain::features::{FeatureGeometry, StageGeometry};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::CnnConfig;

#[derive(Debug, Clone)]
pub struct DescribeConfig {
    /// Read the network config from here instead of `network`
    pub checkpoint_dir: Option<String>,
    pub network:        CnnConfig,
    pub height:         usize,
    pub width:          usize,
}

#[derive(Debug, Clone)]
pub struct NetworkReport {
    pub stages:           Vec<StageGeometry>,
    pub features:         FeatureGeometry,
    pub total_params:     usize,
    pub trainable_params: usize,
}

pub struct DescribeUseCase {
    config: DescribeConfig,
}

impl DescribeUseCase {
    pub fn new(config: DescribeConfig) -> Self {
        Self { config }
    }

    pub fn report<B: Backend>(&self, device: &B::Device) -> Result<NetworkReport> {
        let cfg = &self.config;
        let network = match &cfg.checkpoint_dir {
            Some(dir) => CheckpointManager::new(dir).load_config()?,
            None      => cfg.network.clone(),
        };
        network.validate()?;

        let model = network.init::<B>(device);
        Ok(NetworkReport {
            stages:           network.geometry(cfg.height, cfg.width),
            features:         network.feature_geometry(cfg.height, cfg.width),
            total_params:     model.num_params(),
            trainable_params: model.num_trainable_params(),
        })
    }
}

impl fmt::Display for NetworkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14} {:>8} {:>8} {:>8}", "stage", "channels", "height", "width")?;
        for s in &self.stages {
            writeln!(f, "{:<14} {:>8} {:>8} {:>8}", s.name, s.channels, s.height, s.width)?;
        }
        writeln!(f)?;
        if self.features.is_sequence() {
            writeln!(
                f,
                "features: {} steps x {} channels",
                self.features.steps, self.features.channels
            )?;
        } else {
            writeln!(
                f,
                "features: final map is {} rows high, not a sequence",
                self.features.height
            )?;
        }
        write!(
            f,
            "parameters: {} total, {} trainable",
            self.total_params, self.trainable_params
        )
    }
}
