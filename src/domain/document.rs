// ============================================================
// Layer 3 — Model Description Document
// ============================================================
// The YAML document that describes one run: the dataset, the
// layer stack, the cost, the optimizer and optionally a few
// run-level defaults (backend, batchsize, epochs).
//
// The scalar run-level fields are typed here so the resolver
// can use them directly. The nested blocks stay as raw YAML
// values; the Object Builder and the Data Loader each parse
// the block they own, so a bad `layers` entry is reported by
// the builder and a bad `dataset` block by the loader.
//
// Once parsed the document is never mutated. It is passed by
// reference to every stage that needs it.

use std::{fs, path::Path};

use serde::Deserialize;
use serde_yaml::Value;

use crate::domain::run_config::BackendName;
use crate::error::{Error, Result};

/// A parsed model description document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDocument {
    /// Preferred backend when none is given on the CLI or in the config file
    pub backend: Option<BackendName>,

    /// Preferred minibatch size
    pub batchsize: Option<usize>,

    /// Preferred number of training epochs
    pub epochs: Option<usize>,

    /// `{name, train_config?, test_config?}`
    pub dataset: Option<Value>,

    /// Ordered list of layer descriptions
    pub layers: Option<Value>,

    /// `{type: ...}` cost description
    pub cost: Option<Value>,

    /// `{type: ..., learning_rate: ...}` optimizer description
    pub optimizer: Option<Value>,
}

impl ModelDocument {
    /// Read and parse a document from disk.
    /// A missing or unreadable file is a configuration error: the
    /// document is a required input of every run.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "cannot read model document '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&text).map_err(|e| match e {
            Error::Config { message } => {
                Error::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Parse a document from YAML text.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| Error::config(format!("malformed YAML: {e}")))?;
        if !value.is_mapping() {
            return Err(Error::config("model document must be a YAML mapping"));
        }
        serde_yaml::from_value(value)
            .map_err(|e| Error::config(format!("invalid model document: {e}")))
    }
}
