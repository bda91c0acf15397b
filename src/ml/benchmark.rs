// ============================================================
// Layer 5 — Benchmark
// ============================================================
// Times forward, backward and update phases over a fixed
// number of training iterations, cycling over the training
// data when it runs out. The first `skip` iterations warm up
// and are left out of the statistics.
//
// Runs on a fork of the model and a fresh optimizer, so the
// caller's objects are untouched.
//
// Methods:
//   time  wall-clock around each phase as submitted
//   sync  the phase result is read back to the host before the
//         clock stops, so asynchronous devices are measured too

use std::{fmt, time::Instant};

use anyhow::{Context, Result};
use burn::{module::AutodiffModule, optim::GradientsParams, prelude::*, tensor::backend::AutodiffBackend};

use crate::data::batch::{Batch, DataIterator};
use crate::domain::run_config::{ProfileSettings, ProfilingMethod};
use crate::ml::{
    cost::Cost,
    model::{Model, Network},
    optimizer::Optimizer,
    trainer::prepare,
};

/// Summary statistics for one phase, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseStats {
    pub mean:   f64,
    pub median: f64,
    pub min:    f64,
    pub max:    f64,
}

impl PhaseStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        Some(Self {
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
            min: sorted[0],
            max: sorted[n - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkReport {
    pub method:     ProfilingMethod,
    pub iterations: usize,
    pub skipped:    usize,
    pub fprop:      PhaseStats,
    /// Absent for inference-only runs
    pub bprop:      Option<PhaseStats>,
    pub update:     Option<PhaseStats>,
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Benchmark ({} method, {} iterations, {} skipped), times in ms:",
            self.method,
            self.iterations,
            self.skipped
        )?;
        writeln!(f, "{:<8} {:>10} {:>10} {:>10} {:>10}", "phase", "mean", "median", "min", "max")?;
        let phases = [("fprop", Some(self.fprop)), ("bprop", self.bprop), ("update", self.update)];
        for (name, stats) in phases {
            if let Some(s) = stats {
                writeln!(
                    f,
                    "{:<8} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                    name, s.mean, s.median, s.min, s.max
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Samples {
    fprop:  Vec<f64>,
    bprop:  Vec<f64>,
    update: Vec<f64>,
}

pub fn benchmark<B: AutodiffBackend>(
    model:     &Model<B>,
    optimizer: &Optimizer<B>,
    cost:      &Cost,
    train:     &dyn DataIterator<B>,
    settings:  ProfileSettings,
) -> Result<BenchmarkReport> {
    let mut model = model.fork();
    let mut optimizer = optimizer.fresh();
    prepare(&mut model, train)?;
    let sync = settings.method == ProfilingMethod::Sync;

    tracing::info!(
        "Benchmarking {} iterations ({} skipped, {} method{})",
        settings.iterations,
        settings.skip,
        settings.method,
        if settings.inference { ", inference only" } else { "" }
    );

    let mut samples = Samples::default();
    let mut batches = train.batches();
    for iteration in 0..settings.iterations {
        let batch = match batches.next() {
            Some(batch) => batch,
            None => {
                batches = train.batches();
                batches.next().context("training data produced no batches")?
            }
        }
        .with_context(|| format!("Failed to read batch for iteration {iteration}"))?;

        let record = iteration >= settings.skip;
        if settings.inference {
            let t = forward_only(model.network()?, batch, sync);
            if record {
                samples.fprop.push(t);
            }
        } else {
            let network = model.take_network()?;
            let (network, [f, b, u]) = train_step(network, batch, cost, &mut optimizer, sync);
            model.put_network(network);
            if record {
                samples.fprop.push(f);
                samples.bprop.push(b);
                samples.update.push(u);
            }
        }
    }

    let report = BenchmarkReport {
        method:     settings.method,
        iterations: settings.iterations,
        skipped:    settings.skip,
        fprop:      PhaseStats::from_samples(&samples.fprop).context("no iterations were timed")?,
        bprop:      PhaseStats::from_samples(&samples.bprop),
        update:     PhaseStats::from_samples(&samples.update),
    };
    Ok(report)
}

fn millis(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1e3
}

/// Reading a tensor back waits for every kernel that produces it.
fn settle<B: Backend, const D: usize>(tensor: Tensor<B, D>) {
    let _ = tensor.into_data();
}

fn forward_only<B: AutodiffBackend>(network: &Network<B>, batch: Batch<B>, sync: bool) -> f64 {
    let network = network.valid();
    let inputs = batch.inputs.inner();
    let start = Instant::now();
    let outputs = network.forward(inputs);
    if sync {
        settle(outputs);
    }
    millis(start)
}

fn train_step<B: AutodiffBackend>(
    network:   Network<B>,
    batch:     Batch<B>,
    cost:      &Cost,
    optimizer: &mut Optimizer<B>,
    sync:      bool,
) -> (Network<B>, [f64; 3]) {
    let start = Instant::now();
    let outputs = network.forward(batch.inputs);
    if sync {
        settle(outputs.clone());
    }
    let fprop = millis(start);

    let start = Instant::now();
    let loss = cost.get_cost(outputs, batch.targets);
    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &network);
    if sync {
        if let Some(grad) = first_weight(&network).and_then(|w| grads.get::<B::InnerBackend, 2>(w.id)) {
            settle(grad);
        }
    }
    let bprop = millis(start);

    let start = Instant::now();
    let network = optimizer.step(network, grads);
    if sync {
        if let Some(w) = first_weight(&network) {
            settle(w.val());
        }
    }
    let update = millis(start);

    (network, [fprop, bprop, update])
}

fn first_weight<B: Backend>(network: &Network<B>) -> Option<&burn::module::Param<Tensor<B, 2>>> {
    network
        .layers
        .iter()
        .find_map(|layer| layer.linear.as_ref())
        .map(|linear| &linear.weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::LoaderIterator;
    use crate::data::dataset::{ImageDataset, ImageItem};
    use crate::domain::model_spec::{Activation, CostSpec, LayerSpec, OptimizerSpec};
    use crate::test_support::TestBackend;

    #[test]
    fn median_and_extremes() {
        let s = PhaseStats::from_samples(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!((s.min, s.max, s.median, s.mean), (1.0, 4.0, 2.5, 2.5));
        assert_eq!(PhaseStats::from_samples(&[5.0, 1.0, 9.0]).unwrap().median, 5.0);
        assert!(PhaseStats::from_samples(&[]).is_none());
    }

    fn setup() -> (Model<TestBackend>, Optimizer<TestBackend>, LoaderIterator<TestBackend>) {
        let items = (0..6).map(|i| ImageItem { pixels: vec![i as u8; 4], label: i % 2 }).collect();
        let data = LoaderIterator::new(ImageDataset::new(items, [1, 2, 2], 2), 4, None, &Default::default());
        let layers = vec![LayerSpec::Linear { nout: 2, activation: Activation::Softmax, bias: true }];
        let model = Model::new(layers, Default::default());
        let optimizer = Optimizer::new(OptimizerSpec::Adagrad { learning_rate: 0.1, epsilon: 1e-5 });
        (model, optimizer, data)
    }

    #[test]
    fn cycles_data_and_skips_warmup() {
        let (model, optimizer, data) = setup();
        let settings = ProfileSettings {
            inference:  false,
            method:     ProfilingMethod::Sync,
            iterations: 7,
            skip:       2,
        };
        let cost = Cost::new(CostSpec::CrossEntropyMulti);
        let report = benchmark(&model, &optimizer, &cost, &data, settings).unwrap();

        assert_eq!(report.iterations, 7);
        assert_eq!(report.skipped, 2);
        assert!(report.bprop.is_some() && report.update.is_some());
        assert!(report.fprop.min <= report.fprop.median && report.fprop.median <= report.fprop.max);
        // the caller's model is left alone
        assert!(!model.is_initialized());
        assert!(report.to_string().contains("update"));
    }

    #[test]
    fn inference_only_reports_forward_phase() {
        let (model, optimizer, data) = setup();
        let settings = ProfileSettings {
            inference:  true,
            method:     ProfilingMethod::Time,
            iterations: 3,
            skip:       1,
        };
        let cost = Cost::new(CostSpec::CrossEntropyMulti);
        let report = benchmark(&model, &optimizer, &cost, &data, settings).unwrap();
        assert!(report.bprop.is_none());
        assert!(report.update.is_none());
        assert!(!report.to_string().contains("bprop"));
    }
}
