// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses command line arguments with clap and routes each
// subcommand to its use case. All work is delegated to
// Layer 2 (application).
//
//   1. `init`     — build + save a network
//   2. `extract`  — images → feature sequences
//   3. `describe` — per-stage shapes and parameter counts

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, DescribeArgs, ExtractArgs, InitArgs};

use crate::ml::InferBackend;

#[derive(Parser, Debug)]
#[command(
    name = "aocr-cnn",
    version,
    about = "CRNN-style convolutional feature extractor for text recognition."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Init(args)     => run_init(args),
            Commands::Extract(args)  => run_extract(args),
            Commands::Describe(args) => run_describe(args),
        }
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    use crate::application::init_use_case::InitUseCase;

    let device  = burn::backend::wgpu::WgpuDevice::default();
    let summary = InitUseCase::new(args.try_into()?).execute::<InferBackend>(&device)?;

    println!(
        "Checkpoint saved: {} parameters ({} trainable){}",
        summary.total_params,
        summary.trainable_params,
        if summary.pretrained { ", pretrained backbone" } else { "" }
    );
    Ok(())
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    use crate::application::extract_use_case::ExtractUseCase;

    tracing::info!("Extracting features from: {}", args.input);
    let device   = burn::backend::wgpu::WgpuDevice::default();
    let features = ExtractUseCase::new(args.try_into()?).execute::<InferBackend>(device)?;

    for f in &features {
        println!("{}: {} steps x {} channels", f.source, f.steps, f.channels);
    }
    Ok(())
}

fn run_describe(args: DescribeArgs) -> Result<()> {
    use crate::application::describe_use_case::DescribeUseCase;

    // shape tracing only needs parameter counts, so stay on the CPU
    let device = burn::backend::ndarray::NdArrayDevice::default();
    let report = DescribeUseCase::new(args.try_into()?).report::<burn::backend::NdArray>(&device)?;
    println!("{report}");
    Ok(())
}
