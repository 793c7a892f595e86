// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between image files on disk and a tensor batch:
//
//   .png / .jpg files
//       │
//       ▼
//   ImageLoader       → reads files with the image crate
//       │
//       ▼
//   Preprocessor      → grayscale, fixed height, padded width
//       │
//       ▼
//   ImageDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher      → stacks samples into [n, 1, h, w]
//
// Reference: Burn Book §4 (Datasets and Batchers)

/// Loads image files from a file or directory
pub mod loader;

/// Grayscale conversion, resizing and padding
pub mod preprocessor;

/// Implements Burn's Dataset trait for image samples
pub mod dataset;

/// Implements Burn's Batcher trait to create image batches
pub mod batcher;
