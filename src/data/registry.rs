// ============================================================
// Layer 4 — Dataset Registry
// ============================================================
// The closed set of datasets reachable by name from the model
// document. Names match case-insensitively.

use std::path::Path;

use crate::data::{cifar, dataset::DatasetSplits, mnist};
use crate::error::{Error, Result};

pub type Constructor = fn(&Path) -> Result<DatasetSplits>;

const REGISTRY: &[(&str, Constructor)] = &[
    ("MNIST", mnist::load),
    ("CIFAR10", cifar::load),
];

/// Registered names, for error messages.
pub fn names() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// The loader registered under `name`.
pub fn lookup(name: &str) -> Result<Constructor> {
    REGISTRY
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name.trim()))
        .map(|(_, ctor)| *ctor)
        .ok_or_else(|| Error::lookup("dataset", name, &names()))
}
