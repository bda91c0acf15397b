// ============================================================
// Layer 4 — Host Batch Transforms
// ============================================================
// Wrappers applied to the manifest loader, each one a
// HostIterator around the previous one:
//
//   raw loader → OneHot(n) → TypeCast(datatype) → MeanSubtract(BGR)
//
// Each step insists on the form the previous step produces, so
// the chain only works in that order.

use crate::data::batch::{HostBatch, HostInputs, HostIterator, HostTargets};
use crate::domain::run_config::DataType;
use crate::error::{Error, Result};

/// BGR channel means subtracted from manifest images.
pub const BGR_MEANS: [f64; 3] = [104.0, 119.0, 127.0];

pub trait Transform: Send + Sync {
    fn apply(&self, batch: HostBatch) -> Result<HostBatch>;

    /// Replaces the wrapped iterator's class count when the transform
    /// fixes one.
    fn nclasses(&self) -> Option<usize> {
        None
    }
}

/// `inner` with `transform` applied to every batch.
pub struct Transformed<I, T> {
    inner:     I,
    transform: T,
}

impl<I: HostIterator, T: Transform> HostIterator for Transformed<I, T> {
    fn ndata(&self) -> usize {
        self.inner.ndata()
    }

    fn batch_size(&self) -> usize {
        self.inner.batch_size()
    }

    fn input_shape(&self) -> [usize; 3] {
        self.inner.input_shape()
    }

    fn nclasses(&self) -> usize {
        self.transform.nclasses().unwrap_or_else(|| self.inner.nclasses())
    }

    fn host_batches(&self) -> Box<dyn Iterator<Item = Result<HostBatch>> + '_> {
        Box::new(
            self.inner
                .host_batches()
                .map(move |batch| batch.and_then(|b| self.transform.apply(b))),
        )
    }
}

pub trait Wrap: HostIterator + Sized {
    fn wrap<T: Transform>(self, transform: T) -> Transformed<Self, T> {
        Transformed { inner: self, transform }
    }
}

impl<I: HostIterator> Wrap for I {}

// ─── OneHot ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct OneHot {
    pub nclasses: usize,
}

impl Transform for OneHot {
    fn apply(&self, mut batch: HostBatch) -> Result<HostBatch> {
        let labels = match batch.targets {
            HostTargets::Labels(labels) => labels,
            HostTargets::OneHot { .. } => return Err(Error::config("targets are already one-hot")),
        };
        let mut values = vec![0.0f32; labels.len() * self.nclasses];
        for (row, &label) in labels.iter().enumerate() {
            if label >= self.nclasses {
                return Err(Error::config(format!(
                    "label {label} out of range for {} classes",
                    self.nclasses
                )));
            }
            values[row * self.nclasses + label] = 1.0;
        }
        batch.targets = HostTargets::OneHot { values, nclasses: self.nclasses };
        Ok(batch)
    }

    fn nclasses(&self) -> Option<usize> {
        Some(self.nclasses)
    }
}

// ─── TypeCast ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct TypeCast {
    target: DataType,
}

impl TypeCast {
    pub fn new(target: DataType) -> Result<Self> {
        match target {
            DataType::F32 | DataType::F64 => Ok(Self { target }),
            DataType::F16 => Err(Error::backend("f16 host buffers are not supported")),
        }
    }
}

impl Transform for TypeCast {
    fn apply(&self, mut batch: HostBatch) -> Result<HostBatch> {
        if batch.inputs.datatype() == Some(self.target) {
            return Ok(batch);
        }
        batch.inputs = match (batch.inputs, self.target) {
            (HostInputs::U8(v), DataType::F64) => HostInputs::F64(v.into_iter().map(f64::from).collect()),
            (HostInputs::U8(v), _) => HostInputs::F32(v.into_iter().map(f32::from).collect()),
            (HostInputs::F32(v), DataType::F64) => HostInputs::F64(v.into_iter().map(f64::from).collect()),
            (HostInputs::F64(v), DataType::F32) => HostInputs::F32(v.into_iter().map(|x| x as f32).collect()),
            (same, _) => same,
        };
        Ok(batch)
    }
}

// ─── MeanSubtract ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MeanSubtract {
    means: Vec<f64>,
}

impl MeanSubtract {
    pub fn new(means: &[f64]) -> Self {
        Self { means: means.to_vec() }
    }
}

impl Transform for MeanSubtract {
    fn apply(&self, mut batch: HostBatch) -> Result<HostBatch> {
        let [channels, height, width] = batch.shape;
        if channels != self.means.len() {
            return Err(Error::config(format!(
                "mean subtraction needs {} channels, images have {channels}",
                self.means.len()
            )));
        }
        let plane = height * width;
        let channel_of = |i: usize| (i / plane) % channels;

        match &mut batch.inputs {
            HostInputs::F32(v) => v
                .iter_mut()
                .enumerate()
                .for_each(|(i, x)| *x -= self.means[channel_of(i)] as f32),
            HostInputs::F64(v) => v
                .iter_mut()
                .enumerate()
                .for_each(|(i, x)| *x -= self.means[channel_of(i)]),
            HostInputs::U8(_) => {
                return Err(Error::config("mean subtraction needs floating point inputs"))
            }
        }
        Ok(batch)
    }
}
