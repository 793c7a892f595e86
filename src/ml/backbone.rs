// ============================================================
// Layer 5 — Frozen ResNet-v2 Stage (transfer learning)
// ============================================================
// A pre-activation bottleneck ResNet with the classifier head
// removed, laid out like Keras' ResNet50V2(include_top=False):
//
//   pad 3 → conv 7×7/2 (64, bias)
//   pad 1 → max pool 3×3/2
//   stack1  64 × [3 blocks]   last block stride 2
//   stack2 128 × [4 blocks]   last block stride 2
//   stack3 256 × [6 blocks]   last block stride 2
//   stack4 512 × [3 blocks]   stride 1
//   post BatchNorm → ReLU
//
// Output stride 32, output channels 4 × 512 = 2048.
//
// The stage is frozen:
//   - every parameter has require_grad switched off (no_grad)
//   - batch normalisation always uses the stored statistics,
//     even on an Autodiff backend, so it is implemented here as
//     FrozenBatchNorm instead of burn's BatchNorm
//
// Pretrained weights are loaded into it from a Burn record
// (see infra::checkpoint::CheckpointManager::load_backbone).
//
// Reference: He et al. (2016) Identity Mappings in Deep Residual Networks

use anyhow::{ensure, Result};
use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::MaxPool2dConfig,
        Initializer, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::domain::features::StageGeometry;
use crate::ml::layers::pad2d;

/// Bottleneck output width = filters × EXPANSION
pub const EXPANSION: usize = 4;
const STEM_FILTERS: usize = 64;
const BN_EPSILON:   f64   = 1.001e-5;

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct ResNetStageConfig {
    /// Bottleneck blocks per stack
    #[config(default = "[3, 4, 6, 3]")]
    pub blocks: [usize; 4],
    /// Bottleneck width of the first stack; doubled for each later stack
    #[config(default = 64)]
    pub base_filters: usize,
    #[config(default = 3)]
    pub in_channels: usize,
}

impl ResNetStageConfig {
    pub fn out_channels(&self) -> usize {
        self.stack_filters()[3] * EXPANSION
    }

    fn stack_filters(&self) -> [usize; 4] {
        let f = self.base_filters;
        [f, f * 2, f * 4, f * 8]
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.base_filters > 0, "resnet base_filters must be positive");
        ensure!(
            self.blocks.iter().all(|&b| b >= 2),
            "every resnet stack needs at least 2 blocks, got {:?}",
            self.blocks
        );
        ensure!(
            self.in_channels == 3,
            "the pretrained resnet stage takes 3 input channels, got {}",
            self.in_channels
        );
        Ok(())
    }

    /// Build the stage with identity batch norm and Glorot kernels,
    /// then freeze it. Load pretrained weights on top afterwards.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNetStage<B> {
        let stem = Conv2dConfig::new([self.in_channels, STEM_FILTERS], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Valid)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);

        let mut blocks  = Vec::new();
        let mut current = STEM_FILTERS;

        for (i, (&count, &filters)) in self.blocks.iter().zip(self.stack_filters().iter()).enumerate() {
            let last_stride = if i == 3 { 1 } else { 2 };
            // first block projects the shortcut, last block downsamples
            blocks.push(Bottleneck::new(current, filters, 1, true, device));
            current = filters * EXPANSION;
            for _ in 1..count.saturating_sub(1) {
                blocks.push(Bottleneck::new(current, filters, 1, false, device));
            }
            blocks.push(Bottleneck::new(current, filters, last_stride, false, device));
        }

        ResNetStage {
            stem,
            blocks,
            post_bn: FrozenBatchNorm::new(current, device),
        }
        .no_grad()
    }

    /// Output shape of each part of the stage for an input size.
    pub fn geometry(&self, height: usize, width: usize) -> Vec<StageGeometry> {
        let half = |v: usize| v.div_ceil(2);
        let mut stages = Vec::new();
        let (mut h, mut w) = (half(height), half(width));
        stages.push(StageGeometry::new("resnet_stem", STEM_FILTERS, h, w));
        h = half(h);
        w = half(w);
        stages.push(StageGeometry::new("resnet_pool", STEM_FILTERS, h, w));
        for (i, filters) in self.stack_filters().iter().enumerate() {
            if i < 3 {
                h = half(h);
                w = half(w);
            }
            stages.push(StageGeometry::new(format!("resnet_stack{}", i + 1), filters * EXPANSION, h, w));
        }
        stages
    }
}

// ─── FrozenBatchNorm ──────────────────────────────────────────────────────────

/// Batch normalisation that only ever uses its stored statistics.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    pub gamma:        Param<Tensor<B, 1>>,
    pub beta:         Param<Tensor<B, 1>>,
    pub running_mean: Param<Tensor<B, 1>>,
    pub running_var:  Param<Tensor<B, 1>>,
    pub epsilon:      f64,
}

impl<B: Backend> FrozenBatchNorm<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            gamma:        Param::from_tensor(Tensor::ones([channels], device)),
            beta:         Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var:  Param::from_tensor(Tensor::ones([channels], device)),
            epsilon:      BN_EPSILON,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [channels] = self.gamma.val().dims();
        // y = x * scale + shift, folded per channel
        let scale = self.gamma.val() / self.running_var.val().add_scalar(self.epsilon).sqrt();
        let shift = self.beta.val() - self.running_mean.val() * scale.clone();
        x * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

// ─── Bottleneck ───────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub preact:   FrozenBatchNorm<B>,
    /// 1×1 projection, present on the first block of each stack
    pub shortcut: Option<Conv2d<B>>,
    pub conv1:    Conv2d<B>,
    pub bn1:      FrozenBatchNorm<B>,
    pub conv2:    Conv2d<B>,
    pub bn2:      FrozenBatchNorm<B>,
    pub conv3:    Conv2d<B>,
    pub stride:   usize,
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel:   usize,
    stride:   usize,
    bias:     bool,
    device:   &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Valid)
        .with_bias(bias)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device)
}

impl<B: Backend> Bottleneck<B> {
    fn new(in_channels: usize, filters: usize, stride: usize, project: bool, device: &B::Device) -> Self {
        let out = filters * EXPANSION;
        Self {
            preact:   FrozenBatchNorm::new(in_channels, device),
            shortcut: project.then(|| conv([in_channels, out], 1, stride, true, device)),
            conv1:    conv([in_channels, filters], 1, 1, false, device),
            bn1:      FrozenBatchNorm::new(filters, device),
            conv2:    conv([filters, filters], 3, stride, false, device),
            bn2:      FrozenBatchNorm::new(filters, device),
            conv3:    conv([filters, out], 1, 1, true, device),
            stride,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let preact = relu(self.preact.forward(x.clone()));

        let shortcut = match &self.shortcut {
            Some(projection) => projection.forward(preact.clone()),
            None if self.stride > 1 => MaxPool2dConfig::new([1, 1])
                .with_strides([self.stride, self.stride])
                .init()
                .forward(x),
            None => x,
        };

        let y = relu(self.bn1.forward(self.conv1.forward(preact)));
        let y = pad2d(y, [1, 1, 1, 1], 0.0);
        let y = relu(self.bn2.forward(self.conv2.forward(y)));
        shortcut + self.conv3.forward(y)
    }
}

// ─── ResNetStage ──────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ResNetStage<B: Backend> {
    pub stem:    Conv2d<B>,
    pub blocks:  Vec<Bottleneck<B>>,
    pub post_bn: FrozenBatchNorm<B>,
}

impl<B: Backend> ResNetStage<B> {
    /// [batch, 3, h, w] → [batch, out_channels, ceil(h/32), ceil(w/32)]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(pad2d(x, [3, 3, 3, 3], 0.0));
        let x = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .init()
            .forward(pad2d(x, [1, 1, 1, 1], 0.0));

        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        relu(self.post_bn.forward(x))
    }
}
