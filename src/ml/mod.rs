// ============================================================
// Layer 5 — ML Layer (Burn)
// ============================================================
// All code that touches Burn tensors, modules and optimizers.
//
//   backend.rs    runtime backend name + precision → one Burn
//                 backend type and device for the whole run
//   model.rs      layer stack built from the document, lazily
//                 allocated against the data's input width
//   cost.rs       cross entropy / sum of squares + misclassification
//   optimizer.rs  Burn optimizers behind one type, rebuildable
//   builder.rs    document blocks → model, cost, optimizer
//   trainer.rs    the fit loop
//   callbacks.rs  evaluation, checkpoints, metrics CSV, progress
//   benchmark.rs  per-phase timing of training iterations

/// Backend selection and initialization
pub mod backend;

/// Layer stack and the lazily initialized model
pub mod model;

/// Training objectives
pub mod cost;

/// Type-erased Burn optimizers
pub mod optimizer;

/// Model / cost / optimizer construction
pub mod builder;

/// Epoch loop
pub mod trainer;

/// Fit-loop hooks
pub mod callbacks;

/// Profiling pass
pub mod benchmark;
