// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the `dataset` block of the model document
// and the batches the run driver consumes.
//
//   registered dataset                 i1k manifest
//   ──────────────────                 ────────────
//   registry (mnist / cifar)           ManifestLoader
//       │                                  │  OneHot → TypeCast
//       ▼                                  ▼  → MeanSubtract
//   ImageDataset + ImageBatcher        DeviceIterator
//       │                                  │
//       └────────────► DataIterator ◄──────┘
//
// `loader::load_data` picks the path and returns the
// (train, test) pair.

/// Batch types and the DataIterator contract
pub mod batch;

/// In-memory image splits (Burn Dataset)
pub mod dataset;

/// Burn Batcher and the DataLoader-backed iterator
pub mod batcher;

/// Name → constructor table for built-in datasets
pub mod registry;

/// MNIST IDX reader
pub mod mnist;

/// CIFAR-10 binary reader
pub mod cifar;

/// CSV-manifest image loader
pub mod manifest;

/// OneHot / TypeCast / MeanSubtract wrappers
pub mod transforms;

/// Entry point: dataset block → (train, test) iterators
pub mod loader;
