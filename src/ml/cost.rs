// ============================================================
// Layer 5 — Cost Functions
// ============================================================
// Cross-entropy (binary and multiclass) and sum-of-squares
// costs over a minibatch, plus the top-1 misclassification
// count used by evaluation.

use burn::{prelude::*, tensor::ElementConversion};

use crate::domain::model_spec::CostSpec;

/// Outputs are clamped away from 0 and 1 before taking logs.
const EPS: f64 = 1e-7;

/// Scalar training objective plus the misclassification metric used
/// by evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    spec: CostSpec,
}

impl Cost {
    /// Wrap the document's cost description.
    pub fn new(spec: CostSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> CostSpec {
        self.spec
    }

    /// Mean per-sample cost. outputs, targets: [batch, classes] → [1]
    pub fn get_cost<B: Backend>(&self, outputs: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        match self.spec {
            CostSpec::CrossEntropyMulti => {
                let log_y = outputs.clamp(EPS, 1.0).log();
                (targets * log_y).sum_dim(1).mean().neg()
            }
            CostSpec::CrossEntropyBinary => {
                let y = outputs.clamp(EPS, 1.0 - EPS);
                let positive = targets.clone() * y.clone().log();
                let negative = targets.neg().add_scalar(1.0) * y.neg().add_scalar(1.0).log();
                (positive + negative).sum_dim(1).mean().neg()
            }
            CostSpec::SumSquared => (outputs - targets)
                .powf_scalar(2.0)
                .sum_dim(1)
                .mean()
                .mul_scalar(0.5),
        }
    }

    /// Number of rows whose arg-max output differs from the arg-max target.
    pub fn misclassified<B: Backend>(outputs: Tensor<B, 2>, targets: Tensor<B, 2>) -> usize {
        let rows = outputs.dims()[0];
        let hits = outputs
            .argmax(1)
            .equal(targets.argmax(1))
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        rows.saturating_sub(hits.max(0) as usize)
    }
}
