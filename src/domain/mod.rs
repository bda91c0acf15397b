// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing a run: the parsed model document,
// the typed blocks inside it, and the resolved run parameters.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO tensor or device code
//   - File access only to read the model document itself
//
// Everything downstream (backend, builder, data loader, run
// driver) receives these values by reference.

/// The YAML model description document
pub mod document;

/// Typed `layers` / `cost` / `optimizer` blocks
pub mod model_spec;

/// Typed `dataset` block
pub mod dataset_spec;

/// Resolved run parameters and the precedence rules producing them
pub mod run_config;
