// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `init`, `extract` and `describe`
// and all their configurable flags.
//
// Network-shape flags are shared through `NetworkArgs`
// (flattened into `init` and `describe`).

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    describe_use_case::DescribeConfig,
    extract_use_case::ExtractConfig,
    init_use_case::InitConfig,
};
use crate::ml::backbone::ResNetStageConfig;
use crate::ml::layers::ResidualConfig;
use crate::ml::model::{CnnConfig, StemKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a network (optionally with pretrained ResNet weights) and save it
    Init(InitArgs),

    /// Turn images into feature sequences with a saved network
    Extract(ExtractArgs),

    /// Print per-stage output shapes and parameter counts
    Describe(DescribeArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StemArg {
    /// Classic CRNN conv1..conv4, trained from scratch
    Crnn,
    /// Frozen pretrained ResNet-v2 stage
    Resnet,
}

impl From<StemArg> for StemKind {
    fn from(s: StemArg) -> Self {
        match s {
            StemArg::Crnn   => StemKind::Crnn,
            StemArg::Resnet => StemKind::ResNet,
        }
    }
}

/// Flags describing the network architecture.
#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Front of the network
    #[arg(long, value_enum, default_value_t = StemArg::Crnn)]
    pub stem: StemArg,

    /// 1 for grayscale input, 3 for RGB
    #[arg(long, default_value_t = 1)]
    pub input_channels: usize,

    /// Insert a residual block with this many filters after the stem
    #[arg(long)]
    pub residual_filters: Option<usize>,

    /// Square kernel size of the residual block's convolutions
    #[arg(long, default_value_t = 3)]
    pub residual_kernel: usize,

    /// Filters of conv5 and conv6
    #[arg(long, default_value_t = 512)]
    pub head_filters: usize,

    /// Filters of conv7, the channel count of every output feature vector
    #[arg(long, default_value_t = 1024)]
    pub conv7_filters: usize,

    /// Probability of keeping an activation in the final dropout
    #[arg(long, default_value_t = 0.5)]
    pub keep_prob: f64,

    /// Bottleneck blocks per ResNet stack
    #[arg(long, value_delimiter = ',', default_value = "3,4,6,3")]
    pub resnet_blocks: Vec<usize>,

    /// Bottleneck width of the first ResNet stack
    #[arg(long, default_value_t = 64)]
    pub resnet_width: usize,
}

impl TryFrom<NetworkArgs> for CnnConfig {
    type Error = anyhow::Error;

    fn try_from(a: NetworkArgs) -> anyhow::Result<Self> {
        let blocks: [usize; 4] = a.resnet_blocks.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("--resnet-blocks needs exactly 4 values, got {:?}", a.resnet_blocks)
        })?;
        let residual = a.residual_filters.map(|filters| {
            ResidualConfig::new(filters).with_kernel_size([a.residual_kernel, a.residual_kernel])
        });

        Ok(CnnConfig::new()
            .with_stem(a.stem.into())
            .with_input_channels(a.input_channels)
            .with_residual(residual)
            .with_head_filters(a.head_filters)
            .with_conv7_filters(a.conv7_filters)
            .with_keep_prob(a.keep_prob)
            .with_resnet(
                ResNetStageConfig::new()
                    .with_blocks(blocks)
                    .with_base_filters(a.resnet_width),
            ))
    }
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to save the network config and weights
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Burn record (.mpk.gz, path without extension) of pretrained ResNet-stage weights
    #[arg(long)]
    pub backbone_weights: Option<String>,

    /// Replace an existing checkpoint
    #[arg(long)]
    pub overwrite: bool,

    #[command(flatten)]
    pub network: NetworkArgs,
}

impl TryFrom<InitArgs> for InitConfig {
    type Error = anyhow::Error;

    fn try_from(a: InitArgs) -> anyhow::Result<Self> {
        Ok(InitConfig {
            checkpoint_dir:   a.checkpoint_dir,
            network:          a.network.try_into()?,
            backbone_weights: a.backbone_weights,
            overwrite:        a.overwrite,
        })
    }
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Image file or directory of images
    #[arg(long)]
    pub input: String,

    /// Directory written by `init`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Write features as JSON here; prints a summary only when omitted
    #[arg(long)]
    pub output: Option<String>,

    /// Images are resized to this height
    #[arg(long, default_value_t = 32)]
    pub height: usize,

    /// Images are capped at (and padded to) this width
    #[arg(long, default_value_t = 256)]
    pub max_width: usize,

    /// Keep each image's own width instead of padding to --max-width
    #[arg(long)]
    pub no_pad: bool,

    /// Images per forward pass
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
}

impl TryFrom<ExtractArgs> for ExtractConfig {
    type Error = anyhow::Error;

    fn try_from(a: ExtractArgs) -> anyhow::Result<Self> {
        let cfg = ExtractConfig {
            checkpoint_dir: a.checkpoint_dir,
            input:          a.input,
            output:         a.output,
            height:         a.height,
            max_width:      a.max_width,
            pad:            !a.no_pad,
            batch_size:     a.batch_size,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Input height to trace through the network
    #[arg(long, default_value_t = 32)]
    pub height: usize,

    /// Input width to trace through the network
    #[arg(long, default_value_t = 256)]
    pub width: usize,

    /// Describe the network saved here instead of the one given by flags
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    #[command(flatten)]
    pub network: NetworkArgs,
}

impl TryFrom<DescribeArgs> for DescribeConfig {
    type Error = anyhow::Error;

    fn try_from(a: DescribeArgs) -> anyhow::Result<Self> {
        Ok(DescribeConfig {
            checkpoint_dir: a.checkpoint_dir,
            network:        a.network.try_into()?,
            height:         a.height,
            width:          a.width,
        })
    }
}
