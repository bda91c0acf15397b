// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Manual epoch loop over a DataIterator:
//
//   forward → cost → backward → optimizer step
//
// The network is moved out of the model for each step and put
// back afterwards, since Burn optimizers take and return the
// module by value. Callbacks see the model between steps.
//
// A model loaded from a checkpoint resumes at the epoch after
// the one recorded in the checkpoint.

use anyhow::{Context, Result};
use burn::{
    optim::GradientsParams,
    tensor::{backend::AutodiffBackend, ElementConversion},
};

use crate::data::batch::DataIterator;
use crate::error::Error;
use crate::ml::{
    callbacks::{Callback, FitState},
    cost::Cost,
    model::{output_features, Model},
    optimizer::Optimizer,
};

/// Train `model` until it has completed `epochs` epochs.
pub fn fit<B: AutodiffBackend>(
    model:     &mut Model<B>,
    train:     &dyn DataIterator<B>,
    optimizer: &mut Optimizer<B>,
    cost:      &Cost,
    epochs:    usize,
    callbacks: &mut [Box<dyn Callback<B> + '_>],
) -> Result<FitState> {
    prepare(model, train)?;

    let start = model.epoch_index();
    if start >= epochs {
        tracing::warn!("Model already trained for {start} epochs (requested {epochs}); nothing to do");
    } else if start > 0 {
        tracing::info!("Resuming training at epoch {} of {}", start + 1, epochs);
    }

    let mut state = FitState::new(start, epochs, train.nbatches());
    for cb in callbacks.iter_mut() {
        cb.on_train_begin(&state, model)?;
    }

    for epoch in start + 1..=epochs {
        state.epoch = epoch;
        state.batch = 0;
        state.train_cost = 0.0;
        state.eval = None;
        for cb in callbacks.iter_mut() {
            cb.on_epoch_begin(&state, model)?;
        }

        let mut cost_sum = 0.0;
        for batch in train.batches() {
            let batch = batch.with_context(|| format!("Failed to read training batch in epoch {epoch}"))?;

            let network = model.take_network()?;
            let outputs = network.forward(batch.inputs);
            let loss = cost.get_cost(outputs, batch.targets);
            let value: f64 = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &network);
            let network = optimizer.step(network, grads);
            model.put_network(network);

            cost_sum += value;
            state.batch += 1;
            state.batch_cost = value;
            state.train_cost = cost_sum / state.batch as f64;
            for cb in callbacks.iter_mut() {
                cb.on_minibatch_end(&state, model)?;
            }
        }
        anyhow::ensure!(state.batch > 0, "training data produced no batches");

        model.set_epoch_index(epoch);
        for cb in callbacks.iter_mut() {
            cb.on_epoch_end(&mut state, model)?;
        }
        tracing::info!("Epoch {:>3}/{} | train_cost={:.4}", epoch, epochs, state.train_cost);
    }

    for cb in callbacks.iter_mut() {
        cb.on_train_end(&state, model)?;
    }
    tracing::info!("Training complete after {} epochs", model.epoch_index());
    Ok(state)
}

/// Allocate parameters for the data and check the output width
/// matches its class count.
pub fn prepare<B: AutodiffBackend>(model: &mut Model<B>, data: &dyn DataIterator<B>) -> Result<(), Error> {
    model.initialize(data.input_features())?;
    let nout = output_features(model.layers()).unwrap_or(0);
    if nout != data.nclasses() {
        return Err(Error::config(format!(
            "last linear layer has {nout} outputs but the data has {} classes",
            data.nclasses()
        )));
    }
    Ok(())
}
