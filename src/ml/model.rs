use anyhow::{bail, ensure, Result};
use burn::{
    nn::{Dropout, DropoutConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::domain::features::{FeatureGeometry, StageGeometry};
use crate::ml::backbone::{ResNetStage, ResNetStageConfig};
use crate::ml::layers::{
    attention_map, max_2x1pool, max_2x2pool, ConvBlockConfig, ConvRelu, ConvReluBn, ResidualBlock, ResidualConfig,
};

/// Front of the network, before the optional residual block and the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    /// conv1..conv4 of the classic CRNN, trained from scratch
    Crnn,
    /// Frozen pretrained ResNet-v2 stage
    ResNet,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct CnnConfig {
    #[config(default = "StemKind::Crnn")]
    pub stem:           StemKind,
    #[config(default = 1)]
    pub input_channels: usize,
    /// conv1, conv2, conv3, conv4 widths of the CRNN stem
    #[config(default = "[64, 128, 256, 256]")]
    pub crnn_filters:   [usize; 4],
    #[config(default = "ResNetStageConfig::new()")]
    pub resnet:         ResNetStageConfig,
    /// Optional residual block between the stem and the head
    pub residual:       Option<ResidualConfig>,
    /// conv5 and conv6 width
    #[config(default = 512)]
    pub head_filters:   usize,
    #[config(default = 1024)]
    pub conv7_filters:  usize,
    #[config(default = 0.5)]
    pub keep_prob:      f64,
}

impl CnnConfig {
    /// Reject configurations that cannot be built or cannot run:
    /// zero-width layers, a keep probability outside (0, 1], a channel
    /// count the ResNet stem cannot take, or a residual block that would
    /// have to shrink its input.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.input_channels > 0, "input_channels must be positive");
        ensure!(
            self.crnn_filters.iter().all(|&f| f > 0) && self.head_filters > 0 && self.conv7_filters > 0,
            "every convolution needs at least one filter"
        );
        ensure!(
            self.keep_prob > 0.0 && self.keep_prob <= 1.0,
            "keep_prob must be in (0, 1], got {}",
            self.keep_prob
        );
        if self.stem == StemKind::ResNet {
            ensure!(
                matches!(self.input_channels, 1 | 3),
                "the resnet stem takes 1 or 3 input channels, got {}",
                self.input_channels
            );
            self.resnet.validate()?;
        }
        if let Some(residual) = &self.residual {
            residual.validate(self.stem_channels())?;
        }
        Ok(())
    }

    /// Channel count leaving the stem
    pub fn stem_channels(&self) -> usize {
        match self.stem {
            StemKind::Crnn   => self.crnn_filters[3],
            StemKind::ResNet => self.resnet.out_channels(),
        }
    }

    /// Build the network on `device`.
    ///
    /// Exactly one stem is created. The ResNet stage comes out frozen with
    /// identity batch norm; pretrained weights are loaded afterwards
    /// through the checkpoint manager. Call `validate` first.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cnn<B> {
        let [f1, f2, f3, f4] = self.crnn_filters;

        let crnn = (self.stem == StemKind::Crnn).then(|| CrnnStem {
            conv1: ConvBlockConfig::new([self.input_channels, f1]).init_relu(device),
            conv2: ConvBlockConfig::new([f1, f2]).init_relu(device),
            conv3: ConvBlockConfig::new([f2, f3]).init_relu_bn(device),
            conv4: ConvBlockConfig::new([f3, f4]).init_relu(device),
        });
        let resnet = (self.stem == StemKind::ResNet).then(|| self.resnet.init(device));

        let stem_channels = self.stem_channels();
        let residual      = self.residual.as_ref().map(|r| r.init(stem_channels, device));
        let head_in       = self.residual.as_ref().map_or(stem_channels, |r| r.filters);

        let head = CnnHead {
            conv5: ConvBlockConfig::new([head_in, self.head_filters]).init_relu_bn(device),
            conv6: ConvBlockConfig::new([self.head_filters, self.head_filters]).init_relu(device),
            conv7: ConvBlockConfig::new([self.head_filters, self.conv7_filters])
                .with_kernel_size([2, 2])
                .init_relu_bn(device),
            dropout: DropoutConfig::new(1.0 - self.keep_prob).init(),
        };

        Cnn { crnn, resnet, residual, head, input_channels: self.input_channels }
    }

    /// Output shape of every stage for an input of `height × width`,
    /// computed without building the network.
    pub fn geometry(&self, height: usize, width: usize) -> Vec<StageGeometry> {
        let half = |v: usize| v.div_ceil(2);
        let mut stages = vec![StageGeometry::new("input", self.input_channels, height, width)];
        let (mut h, mut w) = (height, width);

        match self.stem {
            StemKind::Crnn => {
                let [f1, f2, f3, f4] = self.crnn_filters;
                stages.push(StageGeometry::new("conv1", f1, h, w));
                (h, w) = (half(h), half(w));
                stages.push(StageGeometry::new("pool1", f1, h, w));
                stages.push(StageGeometry::new("conv2", f2, h, w));
                (h, w) = (half(h), half(w));
                stages.push(StageGeometry::new("pool2", f2, h, w));
                stages.push(StageGeometry::new("conv3", f3, h, w));
                stages.push(StageGeometry::new("conv4", f4, h, w));
                h = half(h);
                stages.push(StageGeometry::new("pool3", f4, h, w));
            }
            StemKind::ResNet => {
                let resnet = self.resnet.geometry(height, width);
                if let Some(last) = resnet.last() {
                    (h, w) = (last.height, last.width);
                }
                stages.extend(resnet);
            }
        }

        if let Some(residual) = &self.residual {
            stages.push(StageGeometry::new("residual", residual.filters, h, w));
        }

        stages.push(StageGeometry::new("conv5", self.head_filters, h, w));
        stages.push(StageGeometry::new("conv6", self.head_filters, h, w));
        h = half(h);
        stages.push(StageGeometry::new("pool4", self.head_filters, h, w));
        stages.push(StageGeometry::new("conv7", self.conv7_filters, h, w));
        h = half(h);
        stages.push(StageGeometry::new("pool5", self.conv7_filters, h, w));
        stages
    }

    /// Shape of the last stage, read as a feature sequence.
    pub fn feature_geometry(&self, height: usize, width: usize) -> FeatureGeometry {
        let last = self
            .geometry(height, width)
            .pop()
            .unwrap_or_else(|| StageGeometry::new("input", self.input_channels, height, width));
        FeatureGeometry { steps: last.width, channels: last.channels, height: last.height }
    }

    /// The final feature map must collapse to a single row so it can be
    /// read as a sequence.
    pub fn check_input(&self, height: usize, width: usize) -> Result<FeatureGeometry> {
        ensure!(height > 0 && width > 0, "empty input image {height}x{width}");
        let geometry = self.feature_geometry(height, width);
        if !geometry.is_sequence() {
            bail!(
                "input height {height} leaves a feature map {} rows high; \
                 the sequence needs exactly 1 (try --height 32)",
                geometry.height
            );
        }
        Ok(geometry)
    }
}

// ─── Modules ──────────────────────────────────────────────────────────────────

/// conv1 → pool1 → conv2 → pool2 → conv3(bn) → conv4 → pool3(2x1)
#[derive(Module, Debug)]
pub struct CrnnStem<B: Backend> {
    pub conv1: ConvRelu<B>,
    pub conv2: ConvRelu<B>,
    pub conv3: ConvReluBn<B>,
    pub conv4: ConvRelu<B>,
}

impl<B: Backend> CrnnStem<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = max_2x2pool(self.conv1.forward(x));
        let x = max_2x2pool(self.conv2.forward(x));
        let x = self.conv4.forward(self.conv3.forward(x));
        max_2x1pool(x)
    }

    pub fn l2_loss(&self) -> Tensor<B, 1> {
        self.conv1.l2_loss() + self.conv2.l2_loss() + self.conv3.l2_loss() + self.conv4.l2_loss()
    }
}

/// conv5(bn) → conv6 → pool4(2x1) → conv7(bn, 2x2) → pool5(2x1) → dropout
#[derive(Module, Debug)]
pub struct CnnHead<B: Backend> {
    pub conv5:   ConvReluBn<B>,
    pub conv6:   ConvRelu<B>,
    pub conv7:   ConvReluBn<B>,
    pub dropout: Dropout,
}

impl<B: Backend> CnnHead<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = max_2x1pool(self.conv6.forward(self.conv5.forward(x)));
        let x = max_2x1pool(self.conv7.forward(x));
        self.dropout.forward(x)
    }

    pub fn l2_loss(&self) -> Tensor<B, 1> {
        self.conv5.l2_loss() + self.conv6.l2_loss() + self.conv7.l2_loss()
    }
}

#[derive(Module, Debug)]
pub struct Cnn<B: Backend> {
    pub crnn:           Option<CrnnStem<B>>,
    pub resnet:         Option<ResNetStage<B>>,
    pub residual:       Option<ResidualBlock<B>>,
    pub head:           CnnHead<B>,
    pub input_channels: usize,
}

impl<B: Backend> Cnn<B> {
    /// Channel count `forward` expects on its input.
    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    /// images: [batch, channels, h, w], raw 0..=255 → [batch, channels', h', w']
    pub fn forward_map(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = images.sub_scalar(128.0).div_scalar(128.0);

        if let Some(crnn) = &self.crnn {
            x = crnn.forward(x);
        }
        if let Some(resnet) = &self.resnet {
            if self.input_channels == 1 {
                x = Tensor::cat(vec![x.clone(), x.clone(), x], 1);
            }
            x = resnet.forward(x);
        }
        if let Some(residual) = &self.residual {
            x = residual.forward(x);
        }
        self.head.forward(x)
    }

    /// images: [batch, channels, h, w] → features: [batch, steps, channels']
    ///
    /// The final map must be one row high; `CnnConfig::check_input`
    /// tells ahead of time whether an input size gets there.
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let [_, _, in_height, _] = images.dims();
        let map = self.forward_map(images);
        let [batch, channels, height, width] = map.dims();
        if height != 1 {
            bail!(
                "input height {in_height} leaves a feature map {height} rows high; \
                 the sequence needs exactly 1 (try --height 32)"
            );
        }
        Ok(map.reshape([batch, channels, width]).swap_dims(1, 2))
    }

    /// images → [batch, h' * w', channels'] for attention decoders that
    /// attend over every cell of the final map, whatever its height.
    pub fn attention_map(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        attention_map(self.forward_map(images))
    }

    /// Weight decay term over every trainable kernel: Σ sum(w²) / 2.
    /// The frozen ResNet stage is not regularised.
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let mut penalty = self.head.l2_loss();
        if let Some(crnn) = &self.crnn {
            penalty = penalty + crnn.l2_loss();
        }
        if let Some(residual) = &self.residual {
            penalty = penalty + residual.l2_loss();
        }
        penalty
    }

    /// Parameters outside the frozen ResNet stage.
    pub fn num_trainable_params(&self) -> usize {
        let frozen = self.resnet.as_ref().map_or(0, |r| r.num_params());
        self.num_params() - frozen
    }

    /// Re-apply no_grad to the ResNet stage; loading a record can
    /// restore the require_grad flags saved with it.
    pub fn freeze_backbone(mut self) -> Self {
        self.resnet = self.resnet.map(|r| r.no_grad());
        self
    }
}
