// ============================================================
// Layer 6 — Config File
// ============================================================
// Reads the optional `-c/--config` file: a flat YAML mapping
// using the long option names as keys.
//
//   backend: gpu
//   batch_size: 64
//   save_path: out/model
//
// Values here sit between the command line and the model
// document in precedence. Unknown keys are rejected.

use std::{fs, path::Path};

use crate::domain::run_config::RunOverrides;
use crate::error::{Error, Result};

pub fn load_overrides(path: impl AsRef<Path>) -> Result<RunOverrides> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("cannot read config file '{}': {e}", path.display()))
    })?;
    parse_overrides(&text)
        .map_err(|e| Error::config(format!("config file '{}': {e}", path.display())))
}

fn parse_overrides(text: &str) -> std::result::Result<RunOverrides, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(RunOverrides::default());
    }
    serde_yaml::from_str(text)
}
