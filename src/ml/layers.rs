// ============================================================
// Layer 5 — Network Building Blocks
// ============================================================
// The small pieces the CNN is assembled from:
//
//   ConvRelu      conv (SAME, no bias) → ReLU
//   ConvReluBn    conv (SAME, no bias) → BatchNorm → ReLU
//   ResidualBlock ConvReluBn → ConvReluBn, plus a zero-padded
//                 identity shortcut
//   max_2x2pool   halves height and width
//   max_2x1pool   halves height only
//   attention_map flattens h × w into one attention axis
//
// Padding follows TensorFlow's SAME rule: the output of a
// stride-s op is ceil(in / s). Burn only pads symmetrically,
// so the asymmetric part (even kernels, odd inputs) is applied
// by concatenating filler rows/columns before a VALID op.
//
// Training vs. inference:
//   Burn's BatchNorm and Dropout switch on B::ad_enabled().
//   On an Autodiff backend they use batch statistics / drop
//   activations, on the inner backend they don't.
//
// Reference: Burn Book §3 (Building Blocks)
//            Shi et al. (2015) CRNN

use anyhow::{ensure, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::MaxPool2dConfig,
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// BatchNorm decay 0.99 expressed as Burn's running-stat momentum.
pub const BN_MOMENTUM: f64 = 0.01;
pub const BN_EPSILON:  f64 = 1e-3;

// ─── Padding helpers ──────────────────────────────────────────────────────────

/// SAME padding along one axis: (before, after).
pub fn same_padding(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let out   = input.div_ceil(stride);
    let total = ((out.saturating_sub(1)) * stride + kernel).saturating_sub(input);
    let before = total / 2;
    (before, total - before)
}

/// Pad the spatial axes of an NCHW tensor with a constant.
/// `padding` is [top, bottom, left, right].
pub fn pad2d<B: Backend>(x: Tensor<B, 4>, padding: [usize; 4], value: f32) -> Tensor<B, 4> {
    let [top, bottom, left, right] = padding;
    let [n, c, h, w] = x.dims();
    let device = x.device();

    let x = if top + bottom > 0 {
        let mut parts = Vec::with_capacity(3);
        if top > 0 {
            parts.push(Tensor::full([n, c, top, w], value, &device));
        }
        parts.push(x);
        if bottom > 0 {
            parts.push(Tensor::full([n, c, bottom, w], value, &device));
        }
        Tensor::cat(parts, 2)
    } else {
        x
    };

    if left + right == 0 {
        return x;
    }
    let h = h + top + bottom;
    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        parts.push(Tensor::full([n, c, h, left], value, &device));
    }
    parts.push(x);
    if right > 0 {
        parts.push(Tensor::full([n, c, h, right], value, &device));
    }
    Tensor::cat(parts, 3)
}

/// Zero-pad the channel axis up to `channels`.
pub fn pad_channels<B: Backend>(x: Tensor<B, 4>, channels: usize) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    if c >= channels {
        return x;
    }
    let zeros = Tensor::zeros([n, channels - c, h, w], &x.device());
    Tensor::cat(vec![x, zeros], 1)
}

fn same_pad_for<B: Backend>(x: Tensor<B, 4>, kernel: [usize; 2], stride: [usize; 2], value: f32) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    let (top, bottom) = same_padding(h, kernel[0], stride[0]);
    let (left, right) = same_padding(w, kernel[1], stride[1]);
    pad2d(x, [top, bottom, left, right], value)
}

// ─── Pooling ──────────────────────────────────────────────────────────────────

/// Max pooling with SAME padding. Filler is the lowest float so it never wins.
pub fn max_pool_same<B: Backend>(x: Tensor<B, 4>, kernel: [usize; 2], stride: [usize; 2]) -> Tensor<B, 4> {
    let x = same_pad_for(x, kernel, stride, f32::MIN);
    MaxPool2dConfig::new(kernel)
        .with_strides(stride)
        .with_padding(PaddingConfig2d::Valid)
        .init()
        .forward(x)
}

/// 2×2 max pooling, stride 2 on both spatial axes.
pub fn max_2x2pool<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    max_pool_same(x, [2, 2], [2, 2])
}

/// 2×1 max pooling: halves the height, keeps every column.
pub fn max_2x1pool<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    max_pool_same(x, [2, 1], [2, 1])
}

/// [batch, channels, h, w] → [batch, h * w, channels]
pub fn attention_map<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 3> {
    let [n, c, h, w] = x.dims();
    x.reshape([n, c, h * w]).swap_dims(1, 2)
}

// ─── Convolution blocks ───────────────────────────────────────────────────────

/// Configuration shared by `ConvRelu` and `ConvReluBn`.
///
/// Kernels are Xavier-uniform with no bias, and every kernel is
/// regularizable through `l2_loss`. Convolutions are stride 1 with
/// SAME padding for any kernel size.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    /// [in_channels, num_filters]
    pub channels: [usize; 2],
    #[config(default = "[3, 3]")]
    pub kernel_size: [usize; 2],
}

impl ConvBlockConfig {
    fn conv<B: Backend>(&self, device: &B::Device) -> Conv2d<B> {
        // Xavier-uniform kernel, no bias; padding is applied by hand
        Conv2dConfig::new(self.channels, self.kernel_size)
            .with_padding(PaddingConfig2d::Valid)
            .with_bias(false)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device)
    }

    /// Convolution → ReLU.
    pub fn init_relu<B: Backend>(&self, device: &B::Device) -> ConvRelu<B> {
        ConvRelu {
            conv:     self.conv(device),
            kernel_h: self.kernel_size[0],
            kernel_w: self.kernel_size[1],
        }
    }

    /// Convolution → batch norm (decay 0.99, epsilon 1e-3, scale and
    /// centre) → ReLU.
    pub fn init_relu_bn<B: Backend>(&self, device: &B::Device) -> ConvReluBn<B> {
        let bn = BatchNormConfig::new(self.channels[1])
            .with_momentum(BN_MOMENTUM)
            .with_epsilon(BN_EPSILON)
            .init(device);
        ConvReluBn {
            conv:     self.conv(device),
            bn,
            kernel_h: self.kernel_size[0],
            kernel_w: self.kernel_size[1],
        }
    }
}

fn l2_loss<B: Backend>(conv: &Conv2d<B>) -> Tensor<B, 1> {
    conv.weight.val().powf_scalar(2.0).sum().div_scalar(2.0)
}

/// Convolution followed by ReLU.
#[derive(Module, Debug)]
pub struct ConvRelu<B: Backend> {
    pub conv:     Conv2d<B>,
    pub kernel_h: usize,
    pub kernel_w: usize,
}

impl<B: Backend> ConvRelu<B> {
    /// [batch, in, h, w] → [batch, filters, h, w]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = same_pad_for(x, [self.kernel_h, self.kernel_w], [1, 1], 0.0);
        relu(self.conv.forward(x))
    }

    /// sum(w²) / 2 over the kernel
    pub fn l2_loss(&self) -> Tensor<B, 1> {
        l2_loss(&self.conv)
    }
}

/// Convolution → batch normalisation → ReLU.
#[derive(Module, Debug)]
pub struct ConvReluBn<B: Backend> {
    pub conv:     Conv2d<B>,
    pub bn:       BatchNorm<B>,
    pub kernel_h: usize,
    pub kernel_w: usize,
}

impl<B: Backend> ConvReluBn<B> {
    /// [batch, in, h, w] → [batch, filters, h, w]
    ///
    /// Batch statistics on an autodiff backend, running statistics
    /// otherwise.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = same_pad_for(x, [self.kernel_h, self.kernel_w], [1, 1], 0.0);
        relu(self.bn.forward(self.conv.forward(x)))
    }

    /// sum(w²) / 2 over the kernel
    pub fn l2_loss(&self) -> Tensor<B, 1> {
        l2_loss(&self.conv)
    }
}

// ─── Residual block ───────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct ResidualConfig {
    /// Output channels of both convolutions
    pub filters: usize,
    #[config(default = "[3, 3]")]
    pub kernel_size: [usize; 2],
}

impl ResidualConfig {
    /// The shortcut can only grow channels by zero-padding, never shrink them.
    pub fn validate(&self, in_channels: usize) -> Result<()> {
        ensure!(self.filters > 0, "residual block needs at least one filter");
        ensure!(
            self.kernel_size.iter().all(|&k| k > 0),
            "residual kernel size must be positive, got {:?}",
            self.kernel_size
        );
        ensure!(
            self.filters >= in_channels,
            "residual block has {} filters but receives {} channels; \
             the zero-padded shortcut cannot drop channels",
            self.filters,
            in_channels
        );
        Ok(())
    }

    /// Build the block for an input of `in_channels`; run `validate` first.
    pub fn init<B: Backend>(&self, in_channels: usize, device: &B::Device) -> ResidualBlock<B> {
        let conv1 = ConvBlockConfig::new([in_channels, self.filters])
            .with_kernel_size(self.kernel_size)
            .init_relu_bn(device);
        let conv2 = ConvBlockConfig::new([self.filters, self.filters])
            .with_kernel_size(self.kernel_size)
            .init_relu_bn(device);
        ResidualBlock { conv1, conv2, filters: self.filters }
    }
}

/// Two ConvReluBn layers plus a parameter-free shortcut.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv1:   ConvReluBn<B>,
    pub conv2:   ConvReluBn<B>,
    pub filters: usize,
}

impl<B: Backend> ResidualBlock<B> {
    /// [batch, in, h, w] → [batch, filters, h, w]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        // identity, or identity with zero channels appended
        let shortcut = pad_channels(x.clone(), self.filters);
        let out = self.conv2.forward(self.conv1.forward(x));
        out + shortcut
    }

    pub fn l2_loss(&self) -> Tensor<B, 1> {
        self.conv1.l2_loss() + self.conv2.l2_loss()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn input(shape: [usize; 4], values: Vec<f32>) -> Tensor<TB, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn test_same_padding_matches_tensorflow() {
        // stride 2, kernel 2: odd inputs get one row at the end
        assert_eq!(same_padding(5, 2, 2), (0, 1));
        assert_eq!(same_padding(4, 2, 2), (0, 0));
        // stride 1: total k-1, split floor/ceil
        assert_eq!(same_padding(7, 3, 1), (1, 1));
        assert_eq!(same_padding(7, 2, 1), (0, 1));
        assert_eq!(same_padding(7, 7, 2), (3, 3));
    }

    #[test]
    fn test_2x2pool_rounds_up_and_ignores_padding() {
        let x   = input([1, 1, 3, 3], vec![-5.0; 9]);
        let out = max_2x2pool(x);
        assert_eq!(out.dims(), [1, 1, 2, 2]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| v == -5.0));
    }

    #[test]
    fn test_2x1pool_keeps_width() {
        let x   = input([1, 1, 4, 3], (0..12).map(|v| v as f32).collect());
        let out = max_2x1pool(x);
        assert_eq!(out.dims(), [1, 1, 2, 3]);
        // rows (0,1) and (2,3) collapse column by column
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![3.0, 4.0, 5.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_conv_relu_keeps_spatial_shape_for_even_kernel() {
        let device = Default::default();
        let layer  = ConvBlockConfig::new([1, 4])
            .with_kernel_size([2, 2])
            .init_relu::<TB>(&device);
        let out = layer.forward(input([2, 1, 5, 7], vec![1.0; 70]));
        assert_eq!(out.dims(), [2, 4, 5, 7]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_conv_relu_bn_output_shape() {
        let device = Default::default();
        let layer  = ConvBlockConfig::new([3, 8]).init_relu_bn::<TB>(&device);
        let out    = layer.forward(input([1, 3, 4, 6], vec![0.5; 72]));
        assert_eq!(out.dims(), [1, 8, 4, 6]);
    }

    #[test]
    fn test_l2_loss_is_half_sum_of_squares() {
        let device = Default::default();
        let layer  = ConvBlockConfig::new([2, 3]).init_relu::<TB>(&device);
        let w: Vec<f32> = layer.conv.weight.val().into_data().to_vec().unwrap();
        let expected: f32 = w.iter().map(|v| v * v).sum::<f32>() / 2.0;
        let got = layer.l2_loss().into_scalar().elem::<f32>();
        assert!((got - expected).abs() < 1e-5);
    }

    #[test]
    fn test_residual_pads_shortcut_channels() {
        let device = Default::default();
        let cfg    = ResidualConfig::new(6);
        cfg.validate(4).unwrap();
        let block  = cfg.init::<TB>(4, &device);
        let out    = block.forward(input([1, 4, 3, 3], vec![1.0; 36]));
        assert_eq!(out.dims(), [1, 6, 3, 3]);
    }

    #[test]
    fn test_residual_rejects_shrinking_channels() {
        let err = ResidualConfig::new(2).validate(4).unwrap_err();
        assert!(err.to_string().contains("cannot drop channels"));
    }

    #[test]
    fn test_pad_channels_appends_zeros() {
        let out = pad_channels(input([1, 1, 1, 2], vec![7.0, 8.0]), 3);
        assert_eq!(out.dims(), [1, 3, 1, 2]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![7.0, 8.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_attention_map_flattens_row_major() {
        // 2 channels, 2x2 map; channel 0 = 0..4, channel 1 = 10..14
        let x   = input([1, 2, 2, 2], vec![0., 1., 2., 3., 10., 11., 12., 13.]);
        let out = attention_map(x);
        assert_eq!(out.dims(), [1, 4, 2]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0., 10., 1., 11., 2., 12., 3., 13.]);
    }
}
