// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each:
//
//   init     — build a network, optionally load pretrained
//              ResNet weights, save config + weights
//   extract  — restore a network and turn images into
//              feature sequences
//   describe — report per-stage shapes and parameter counts
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Every use case is generic over the Burn backend so tests can
// run on NdArray while the CLI uses Wgpu.

pub mod init_use_case;

pub mod extract_use_case;

pub mod describe_use_case;
