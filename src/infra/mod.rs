// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence concerns:
//
//   checkpoint.rs — Saving and loading the network
//                   Uses Burn's named MessagePack recorder at full
//                   precision for weights and
//                   JSON for the CnnConfig so the exact
//                   architecture can be rebuilt before the
//                   weights are loaded into it. Also loads
//                   pretrained ResNet-stage records and writes
//                   extracted features.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling with anyhow)

/// Network checkpoint saving and loading
pub mod checkpoint;
