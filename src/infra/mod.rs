// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File formats and process-wide plumbing used by the layers
// above:
//
//   checkpoint.rs   parameter record + JSON sidecar on disk
//   metrics.rs      per-epoch CSV log
//   config_file.rs  the optional `-c` YAML settings file
//   logging.rs      tracing subscriber setup

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Option-name YAML config file
pub mod config_file;

/// Global tracing subscriber
pub mod logging;
