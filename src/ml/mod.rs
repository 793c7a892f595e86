// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn network code lives here.
//
//   layers.rs    — building blocks: ConvRelu, ConvReluBn,
//                  ResidualBlock, SAME max pooling,
//                  attention_map
//
//   backbone.rs  — frozen ResNet-v2 stage for transfer
//                  learning (pretrained weights loaded from
//                  a Burn record)
//
//   model.rs     — CnnConfig / Cnn: normalisation → stem
//                  (CRNN or ResNet) → optional residual block
//                  → conv5..conv7 head → feature sequence
//
//   extractor.rs — runs a restored network over images in
//                  batches and returns FeatureSequences
//
// Reference: Burn Book §3 (Building Blocks)
//            Shi et al. (2015) CRNN

/// Convolution, pooling and residual building blocks
pub mod layers;

/// Frozen pretrained ResNet-v2 stage
pub mod backbone;

/// The CNN feature extractor architecture
pub mod model;

/// Batched inference over preprocessed images
pub mod extractor;

/// Backend used by the CLI for inference
pub type InferBackend = burn::backend::Wgpu;
