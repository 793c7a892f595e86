// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what flows through
// the system: images going in, feature sequences coming out.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A preprocessed grayscale image ready for the network
pub mod image_sample;

// The network output for one image, plus its shape description
pub mod features;

// Core abstractions (traits) that other layers implement
pub mod traits;
