// ============================================================
// Layer 5 — Model Object Builder
// ============================================================
// Turns the `layers` / `cost` / `optimizer` blocks of the model
// document into runnable objects on the initialized backend.
// Parameters are not allocated here unless a checkpoint is
// loaded; otherwise they wait for the training data to fix the
// input width.

use crate::domain::{
    document::ModelDocument,
    model_spec::{parse_cost, parse_layers, parse_optimizer, Activation, CostSpec, LayerSpec},
    run_config::RunConfig,
};
use crate::error::Result;
use crate::ml::{backend::BackendContext, cost::Cost, model::Model, optimizer::Optimizer};

use burn::tensor::backend::AutodiffBackend;

/// The model, its cost and its optimizer, built together.
#[derive(Debug)]
pub struct ModelObjects<B: AutodiffBackend> {
    pub model:     Model<B>,
    pub cost:      Cost,
    pub optimizer: Optimizer<B>,
}

pub fn create_objects<B: AutodiffBackend>(
    doc:     &ModelDocument,
    cfg:     &RunConfig,
    backend: &BackendContext<B>,
) -> Result<ModelObjects<B>> {
    let layers = parse_layers(doc.layers.as_ref())?;
    let cost = parse_cost(doc.cost.as_ref())?;
    let optimizer = parse_optimizer(doc.optimizer.as_ref())?;

    if cost == CostSpec::CrossEntropyMulti && !ends_in_softmax(&layers) {
        tracing::warn!("cross_entropy_multi expects probabilities but the last layer is not softmax");
    }

    let mut model = Model::new(layers, backend.device.clone());
    if let Some(path) = &cfg.model_file {
        model.load_params(path)?;
        if let Some(n) = model.input_features() {
            tracing::info!("Restored parameters for {n} input features at epoch {}", model.epoch_index());
        }
    }

    let objects = ModelObjects {
        model,
        cost: Cost::new(cost),
        optimizer: Optimizer::new(optimizer),
    };
    tracing::info!(
        "Built model: {} layers, cost {:?}, optimizer {:?}",
        objects.model.layers().len(),
        objects.cost.spec(),
        objects.optimizer.spec()
    );
    Ok(objects)
}

fn ends_in_softmax(layers: &[LayerSpec]) -> bool {
    layers.iter().rev().find_map(|l| match l {
        LayerSpec::Linear { activation, .. } => Some(*activation),
        LayerSpec::Activation { transform } => Some(*transform),
        LayerSpec::Dropout { .. } => None,
    }) == Some(Activation::Softmax)
}
