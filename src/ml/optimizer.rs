// ============================================================
// Layer 5 — Optimizers
// ============================================================
// Maps the document's optimizer block onto Burn's optimizer
// configs (SGD with momentum and weight decay, Adam, AdaGrad,
// RMSProp) and applies one update per minibatch.

use burn::{
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, AdaGradConfig, AdamConfig,
        GradientsParams, Optimizer as BurnOptimizer, RmsPropConfig, SgdConfig,
    },
    tensor::backend::AutodiffBackend,
};

use crate::domain::model_spec::OptimizerSpec;
use crate::ml::model::Network;

/// One update step over the whole network. Every Burn optimizer built
/// for `Network<B>` implements this, which lets the run hold any of
/// them behind one box.
pub trait NetworkStep<B: AutodiffBackend> {
    fn step(&mut self, lr: f64, network: Network<B>, grads: GradientsParams) -> Network<B>;
}

impl<B, O> NetworkStep<B> for O
where
    B: AutodiffBackend,
    O: BurnOptimizer<Network<B>, B>,
{
    fn step(&mut self, lr: f64, network: Network<B>, grads: GradientsParams) -> Network<B> {
        BurnOptimizer::step(self, lr, network, grads)
    }
}

/// The optimizer named by the model document, with its own state.
pub struct Optimizer<B: AutodiffBackend> {
    spec:  OptimizerSpec,
    inner: Box<dyn NetworkStep<B>>,
}

impl<B: AutodiffBackend> Optimizer<B> {
    pub fn new(spec: OptimizerSpec) -> Self {
        let inner = build::<B>(&spec);
        Self { spec, inner }
    }

    pub fn spec(&self) -> &OptimizerSpec {
        &self.spec
    }

    pub fn learning_rate(&self) -> f64 {
        self.spec.learning_rate()
    }

    /// Same hyperparameters, no accumulated state.
    pub fn fresh(&self) -> Self {
        Self::new(self.spec.clone())
    }

    /// Apply `grads` at the configured learning rate.
    pub fn step(&mut self, network: Network<B>, grads: GradientsParams) -> Network<B> {
        self.inner.step(self.spec.learning_rate(), network, grads)
    }
}

impl<B: AutodiffBackend> std::fmt::Debug for Optimizer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer").field("spec", &self.spec).finish()
    }
}

fn weight_decay(penalty: f32) -> Option<WeightDecayConfig> {
    (penalty > 0.0).then(|| WeightDecayConfig::new(penalty))
}

fn build<B: AutodiffBackend>(spec: &OptimizerSpec) -> Box<dyn NetworkStep<B>> {
    match *spec {
        OptimizerSpec::Sgd { momentum, weight_decay: decay, nesterov, .. } => {
            let momentum = (momentum > 0.0).then(|| {
                MomentumConfig::new()
                    .with_momentum(momentum)
                    .with_dampening(0.0)
                    .with_nesterov(nesterov)
            });
            let config = SgdConfig::new()
                .with_momentum(momentum)
                .with_weight_decay(weight_decay(decay as f32));
            Box::new(config.init::<B, Network<B>>())
        }
        OptimizerSpec::Adam { beta_1, beta_2, epsilon, weight_decay: decay, .. } => {
            let config = AdamConfig::new()
                .with_beta_1(beta_1)
                .with_beta_2(beta_2)
                .with_epsilon(epsilon)
                .with_weight_decay(weight_decay(decay));
            Box::new(config.init::<B, Network<B>>())
        }
        OptimizerSpec::Rmsprop { decay_rate, epsilon, .. } => {
            let config = RmsPropConfig::new().with_alpha(decay_rate).with_epsilon(epsilon);
            Box::new(config.init::<B, Network<B>>())
        }
        OptimizerSpec::Adagrad { epsilon, .. } => {
            let config = AdaGradConfig::new().with_epsilon(epsilon);
            Box::new(config.init::<B, Network<B>>())
        }
    }
}
