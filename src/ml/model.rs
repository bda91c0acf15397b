// ============================================================
// Layer 5 — Model
// ============================================================
// The layer list from the document, and the Burn network it
// becomes once the input width is known. Parameters are
// allocated lazily on the first batch, or restored from a
// checkpoint together with the completed-epoch count.

use std::path::Path;

use burn::{
    module::Ignored,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::{activation, backend::AutodiffBackend},
};

use crate::domain::model_spec::{Activation, LayerSpec};
use crate::error::{Error, Result};
use crate::infra::checkpoint::{Checkpoint, CheckpointMeta};

/// One entry of the layer stack. A linear entry carries weights and
/// an activation; dropout and activation entries carry no weights.
#[derive(Module, Debug)]
pub struct Layer<B: Backend> {
    pub linear:     Option<Linear<B>>,
    pub dropout:    Option<Dropout>,
    pub activation: Ignored<Activation>,
}

impl<B: Backend> Layer<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = match &self.linear {
            Some(linear) => linear.forward(x),
            None => x,
        };
        let x = match &self.dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        };
        activate(self.activation.0, x)
    }
}

/// The parameter-holding network built from a layer list.
#[derive(Module, Debug)]
pub struct Network<B: Backend> {
    pub layers: Vec<Layer<B>>,
}

impl<B: Backend> Network<B> {
    /// Build one Burn layer per entry, chaining widths from `input_features`.
    pub fn init(specs: &[LayerSpec], input_features: usize, device: &B::Device) -> Self {
        let mut width = input_features;
        let layers = specs
            .iter()
            .map(|spec| match *spec {
                LayerSpec::Linear { nout, activation, bias } => {
                    let linear = LinearConfig::new(width, nout).with_bias(bias).init(device);
                    width = nout;
                    Layer {
                        linear:     Some(linear),
                        dropout:    None,
                        activation: Ignored(activation),
                    }
                }
                LayerSpec::Dropout { keep } => Layer {
                    linear:     None,
                    dropout:    Some(DropoutConfig::new(1.0 - keep).init()),
                    activation: Ignored(Activation::Identity),
                },
                LayerSpec::Activation { transform } => Layer {
                    linear:     None,
                    dropout:    None,
                    activation: Ignored(transform),
                },
            })
            .collect();
        Self { layers }
    }

    /// inputs: [batch, features] → outputs: [batch, nout of last linear]
    pub fn forward(&self, inputs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layers.iter().fold(inputs, |x, layer| layer.forward(x))
    }
}

/// Apply a document activation to a `[batch, features]` tensor.
pub fn activate<B: Backend>(kind: Activation, x: Tensor<B, 2>) -> Tensor<B, 2> {
    match kind {
        Activation::Identity => x,
        Activation::Relu => activation::relu(x),
        Activation::Sigmoid => activation::sigmoid(x),
        Activation::Tanh => activation::tanh(x),
        Activation::Softmax => activation::softmax(x, 1),
    }
}

/// Width of the output of a layer stack.
pub fn output_features(specs: &[LayerSpec]) -> Option<usize> {
    specs.iter().rev().find_map(|spec| match spec {
        LayerSpec::Linear { nout, .. } => Some(*nout),
        _ => None,
    })
}

/// A model as the run driver sees it: the layer description plus
/// the network, which is allocated once the input width is known
/// (from the training data or from a checkpoint).
#[derive(Debug)]
pub struct Model<B: AutodiffBackend> {
    layers:         Vec<LayerSpec>,
    network:        Option<Network<B>>,
    input_features: Option<usize>,
    epoch_index:    usize,
    device:         B::Device,
}

impl<B: AutodiffBackend> Model<B> {
    /// An uninitialized model; no parameters exist until [`Model::initialize`].
    pub fn new(layers: Vec<LayerSpec>, device: B::Device) -> Self {
        Self {
            layers,
            network: None,
            input_features: None,
            epoch_index: 0,
            device,
        }
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    /// Number of epochs already completed (non-zero after a resume).
    pub fn epoch_index(&self) -> usize {
        self.epoch_index
    }

    pub fn set_epoch_index(&mut self, epoch: usize) {
        self.epoch_index = epoch;
    }

    pub fn input_features(&self) -> Option<usize> {
        self.input_features
    }

    pub fn is_initialized(&self) -> bool {
        self.network.is_some()
    }

    /// Allocate parameters for `input_features` inputs. A model that
    /// already holds parameters only checks that the width matches.
    pub fn initialize(&mut self, input_features: usize) -> Result<()> {
        if let Some(existing) = self.input_features {
            if existing != input_features {
                return Err(Error::config(format!(
                    "model expects {existing} input features but the data provides {input_features}"
                )));
            }
            return Ok(());
        }
        tracing::debug!("Allocating network for {} input features", input_features);
        self.network = Some(Network::init(&self.layers, input_features, &self.device));
        self.input_features = Some(input_features);
        Ok(())
    }

    pub fn network(&self) -> Result<&Network<B>> {
        self.network
            .as_ref()
            .ok_or_else(|| Error::config("model used before initialization"))
    }

    /// Move the network out for an optimizer step; hand it back with
    /// [`Model::put_network`].
    pub fn take_network(&mut self) -> Result<Network<B>> {
        self.network
            .take()
            .ok_or_else(|| Error::config("model used before initialization"))
    }

    pub fn put_network(&mut self, network: Network<B>) {
        self.network = Some(network);
    }

    /// A second model sharing this one's layer parameters, with no
    /// training progress recorded.
    pub fn fork(&self) -> Self {
        Self {
            layers:         self.layers.clone(),
            network:        self.network.clone(),
            input_features: self.input_features,
            epoch_index:    0,
            device:         self.device.clone(),
        }
    }

    /// Restore parameters and the completed-epoch count from a checkpoint.
    pub fn load_params(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let checkpoint = Checkpoint::new(path.as_ref());
        let meta = checkpoint.load_meta()?;
        if meta.layers != self.layers {
            return Err(Error::invalid_file(
                checkpoint.meta_path(),
                "checkpoint was saved from a different layer stack",
            ));
        }

        let blank = Network::init(&self.layers, meta.input_features, &self.device);
        let network = checkpoint.load_network(blank, &self.device)?;

        tracing::info!(
            "Loaded parameters from '{}' (epoch {})",
            checkpoint.record_path().display(),
            meta.epoch
        );
        self.network = Some(network);
        self.input_features = Some(meta.input_features);
        self.epoch_index = meta.epoch;
        Ok(())
    }

    /// Write parameters plus metadata recording `epoch` completed epochs.
    pub fn save_params(&self, path: impl AsRef<Path>, epoch: usize) -> Result<()> {
        let network = self.network()?;
        let input_features = self
            .input_features
            .ok_or_else(|| Error::config("model used before initialization"))?;
        let meta = CheckpointMeta {
            epoch,
            input_features,
            layers: self.layers.clone(),
        };
        Checkpoint::new(path.as_ref()).save(network, &meta)
    }
}
