// ============================================================
// Layer 3 — Model, Cost and Optimizer Descriptions
// ============================================================
// Typed views of the `layers`, `cost` and `optimizer` blocks of
// the model document. Each block is tagged by a `type` key:
//
//   layers:
//     - {type: linear, nout: 100, activation: relu}
//     - {type: dropout, keep: 0.5}
//     - {type: linear, nout: 10, activation: softmax}
//   cost: {type: cross_entropy_multi}
//   optimizer: {type: sgd, learning_rate: 0.1, momentum: 0.9}
//
// Parsing reports a missing block or an unknown `type` as a
// configuration error naming the offending block.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::{Error, Result};

pub const LAYER_TYPES:     &[&str] = &["linear", "affine", "dropout", "activation"];
pub const COST_TYPES:      &[&str] = &["cross_entropy_multi", "cross_entropy_binary", "sum_squared"];
pub const OPTIMIZER_TYPES: &[&str] = &["sgd", "gradient_descent_momentum", "adam", "rmsprop", "adagrad"];

/// Element-wise output transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

/// One entry of the `layers` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Fully connected layer followed by an activation
    #[serde(alias = "affine")]
    Linear {
        nout: usize,
        #[serde(default)]
        activation: Activation,
        #[serde(default = "default_true")]
        bias: bool,
    },
    /// Dropout keeping each unit with probability `keep`
    Dropout { keep: f64 },
    /// A standalone activation
    Activation { transform: Activation },
}

fn default_true() -> bool {
    true
}

/// The `cost` block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostSpec {
    CrossEntropyMulti,
    CrossEntropyBinary,
    SumSquared,
}

/// The `optimizer` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerSpec {
    #[serde(alias = "gradient_descent_momentum")]
    Sgd {
        learning_rate: f64,
        #[serde(default)]
        momentum:      f64,
        #[serde(default)]
        weight_decay:  f64,
        #[serde(default)]
        nesterov:      bool,
    },
    Adam {
        #[serde(default = "adam_lr")]
        learning_rate: f64,
        #[serde(default = "adam_beta_1")]
        beta_1:        f32,
        #[serde(default = "adam_beta_2")]
        beta_2:        f32,
        #[serde(default = "adam_epsilon")]
        epsilon:       f32,
        #[serde(default)]
        weight_decay:  f32,
    },
    Rmsprop {
        #[serde(default = "rmsprop_lr")]
        learning_rate: f64,
        #[serde(default = "rmsprop_decay")]
        decay_rate:    f32,
        #[serde(default = "rmsprop_epsilon")]
        epsilon:       f32,
    },
    Adagrad {
        #[serde(default = "adagrad_lr")]
        learning_rate: f64,
        #[serde(default = "adagrad_epsilon")]
        epsilon:       f32,
    },
}

fn adam_lr() -> f64 { 0.001 }
fn adam_beta_1() -> f32 { 0.9 }
fn adam_beta_2() -> f32 { 0.999 }
fn adam_epsilon() -> f32 { 1e-8 }
fn rmsprop_lr() -> f64 { 0.002 }
fn rmsprop_decay() -> f32 { 0.95 }
fn rmsprop_epsilon() -> f32 { 1e-6 }
fn adagrad_lr() -> f64 { 0.01 }
fn adagrad_epsilon() -> f32 { 1e-5 }

impl OptimizerSpec {
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerSpec::Sgd { learning_rate, .. }
            | OptimizerSpec::Adam { learning_rate, .. }
            | OptimizerSpec::Rmsprop { learning_rate, .. }
            | OptimizerSpec::Adagrad { learning_rate, .. } => *learning_rate,
        }
    }
}

// ─── Block parsing ───────────────────────────────────────────────────────────

/// Parse the `layers` block. An empty list is rejected.
pub fn parse_layers(block: Option<&Value>) -> Result<Vec<LayerSpec>> {
    let block = block.ok_or_else(|| Error::config("model document has no 'layers' block"))?;
    let items = block
        .as_sequence()
        .ok_or_else(|| Error::config("'layers' must be a list"))?;
    if items.is_empty() {
        return Err(Error::config("'layers' must not be empty"));
    }

    let mut layers = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let layer: LayerSpec = parse_tagged(item, "layers", Some(index), LAYER_TYPES)?;
        validate_layer(&layer, index)?;
        layers.push(layer);
    }
    if !layers.iter().any(|l| matches!(l, LayerSpec::Linear { .. })) {
        return Err(Error::config("'layers' needs at least one linear layer"));
    }
    Ok(layers)
}

/// Parse the `cost` block.
pub fn parse_cost(block: Option<&Value>) -> Result<CostSpec> {
    let block = block.ok_or_else(|| Error::config("model document has no 'cost' block"))?;
    parse_tagged(block, "cost", None, COST_TYPES)
}

/// Parse the `optimizer` block.
pub fn parse_optimizer(block: Option<&Value>) -> Result<OptimizerSpec> {
    let block = block.ok_or_else(|| Error::config("model document has no 'optimizer' block"))?;
    let spec: OptimizerSpec = parse_tagged(block, "optimizer", None, OPTIMIZER_TYPES)?;
    if !(spec.learning_rate() > 0.0) {
        return Err(Error::config("optimizer learning_rate must be > 0"));
    }
    Ok(spec)
}

fn validate_layer(layer: &LayerSpec, index: usize) -> Result<()> {
    match layer {
        LayerSpec::Linear { nout: 0, .. } => Err(Error::config(format!(
            "layers[{index}]: nout must be > 0"
        ))),
        LayerSpec::Dropout { keep } if !(*keep > 0.0 && *keep <= 1.0) => Err(Error::config(
            format!("layers[{index}]: dropout keep must be in (0, 1], got {keep}"),
        )),
        _ => Ok(()),
    }
}

/// Deserialize a `{type: ...}` mapping, turning an unknown tag
/// into a lookup-flavoured configuration message.
fn parse_tagged<T: serde::de::DeserializeOwned>(
    value: &Value,
    block: &str,
    index: Option<usize>,
    known: &[&str],
) -> Result<T> {
    let location = match index {
        Some(i) => format!("{block}[{i}]"),
        None => block.to_string(),
    };
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::config(format!("{location}: missing 'type' key")))?;
    if !known.contains(&tag) {
        return Err(Error::config(format!(
            "{location}: unknown type '{tag}' (known: {})",
            known.join(", ")
        )));
    }
    serde_yaml::from_value(value.clone())
        .map_err(|e| Error::config(format!("{location}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn parses_layer_list() {
        let v = yaml(
            "- {type: affine, nout: 32, activation: relu}\n\
             - {type: dropout, keep: 0.5}\n\
             - {type: linear, nout: 10, activation: softmax, bias: false}\n",
        );
        let layers = parse_layers(Some(&v)).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(
            layers[0],
            LayerSpec::Linear { nout: 32, activation: Activation::Relu, bias: true }
        );
        assert_eq!(layers[1], LayerSpec::Dropout { keep: 0.5 });
        assert_eq!(
            layers[2],
            LayerSpec::Linear { nout: 10, activation: Activation::Softmax, bias: false }
        );
    }

    #[test]
    fn missing_blocks_are_config_errors() {
        assert!(matches!(parse_layers(None), Err(Error::Config { .. })));
        assert!(matches!(parse_cost(None), Err(Error::Config { .. })));
        assert!(matches!(parse_optimizer(None), Err(Error::Config { .. })));
    }

    #[test]
    fn unknown_layer_type_names_the_entry() {
        let v = yaml("- {type: linear, nout: 4}\n- {type: conv3d, nout: 4}\n");
        let err = parse_layers(Some(&v)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("layers[1]"), "{msg}");
        assert!(msg.contains("conv3d"), "{msg}");
    }

    #[test]
    fn dropout_only_stack_is_rejected() {
        let v = yaml("- {type: dropout, keep: 0.5}\n");
        assert!(matches!(parse_layers(Some(&v)), Err(Error::Config { .. })));
    }

    #[test]
    fn keep_probability_is_checked() {
        let v = yaml("- {type: linear, nout: 4}\n- {type: dropout, keep: 0.0}\n");
        assert!(matches!(parse_layers(Some(&v)), Err(Error::Config { .. })));
    }

    #[test]
    fn parses_costs() {
        assert_eq!(
            parse_cost(Some(&yaml("{type: sum_squared}"))).unwrap(),
            CostSpec::SumSquared
        );
        assert!(matches!(
            parse_cost(Some(&yaml("{type: hinge}"))),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn optimizer_defaults_fill_in() {
        let spec = parse_optimizer(Some(&yaml("{type: adam}"))).unwrap();
        match spec {
            OptimizerSpec::Adam { learning_rate, beta_1, beta_2, .. } => {
                assert!((learning_rate - 0.001).abs() < 1e-12);
                assert!((beta_1 - 0.9).abs() < 1e-6);
                assert!((beta_2 - 0.999).abs() < 1e-6);
            }
            other => panic!("expected adam, got {other:?}"),
        }
    }

    #[test]
    fn sgd_alias_and_required_learning_rate() {
        let spec = parse_optimizer(Some(&yaml(
            "{type: gradient_descent_momentum, learning_rate: 0.1, momentum: 0.9}",
        )))
        .unwrap();
        assert!(matches!(spec, OptimizerSpec::Sgd { momentum, .. } if (momentum - 0.9).abs() < 1e-12));

        let err = parse_optimizer(Some(&yaml("{type: sgd}"))).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
