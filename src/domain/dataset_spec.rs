// ============================================================
// Layer 3 — Dataset Description
// ============================================================
// The `dataset` block of the model document:
//
//   dataset:
//     name: i1k
//     train_config: {height: 224, width: 224}
//     test_config:  {height: 224, width: 224}
//
// The two config blocks stay as free-form YAML mappings because
// the specialized loader injects extra keys into them before
// reading them back.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub name:         String,
    pub train_config: Mapping,
    pub test_config:  Mapping,
}

impl DatasetSpec {
    /// Parse the `dataset` block. A missing block, a missing name or
    /// a non-mapping config block is a configuration error.
    pub fn parse(block: Option<&Value>) -> Result<Self> {
        let block = block.ok_or_else(|| Error::config("model document has no 'dataset' block"))?;
        let map = block
            .as_mapping()
            .ok_or_else(|| Error::config("'dataset' must be a mapping"))?;

        let name = map
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::config("'dataset' needs a non-empty 'name'"))?
            .to_string();

        Ok(Self {
            name,
            train_config: sub_mapping(map, "train_config")?,
            test_config:  sub_mapping(map, "test_config")?,
        })
    }
}

fn sub_mapping(map: &Mapping, key: &str) -> Result<Mapping> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Mapping::new()),
        Some(Value::Mapping(m)) => Ok(m.clone()),
        Some(_) => Err(Error::config(format!("'dataset.{key}' must be a mapping"))),
    }
}
