// ============================================================
// Layer 4 — Batches and Data Iterators
// ============================================================
// A `Batch` is what the run driver consumes: an input matrix
// [batch, features] and a one-hot target matrix [batch, classes]
// on the run's device.
//
// `DataIterator` is the contract every loader satisfies: a
// finite sequence of batches that starts over on every call to
// `batches()`, plus the shape facts the model needs before it
// allocates parameters.
//
// `HostBatch` is the CPU-side form used by the manifest pipeline,
// where the transforms (one-hot, type cast, mean subtraction)
// run before anything is uploaded.

use burn::prelude::*;

use crate::domain::run_config::DataType;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Batch<B: Backend> {
    /// [batch, features]
    pub inputs:  Tensor<B, 2>,
    /// [batch, classes], one-hot
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> Batch<B> {
    pub fn size(&self) -> usize {
        self.inputs.dims()[0]
    }
}

pub trait DataIterator<B: Backend> {
    /// Number of samples in one pass.
    fn ndata(&self) -> usize;

    fn batch_size(&self) -> usize;

    fn nbatches(&self) -> usize {
        self.ndata().div_ceil(self.batch_size().max(1))
    }

    /// [channels, height, width] of one sample
    fn input_shape(&self) -> [usize; 3];

    fn input_features(&self) -> usize {
        self.input_shape().iter().product()
    }

    fn nclasses(&self) -> usize;

    /// Start a new pass over the data.
    fn batches(&self) -> Box<dyn Iterator<Item = Result<Batch<B>>> + '_>;
}

// ─── Host-side batches ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HostInputs {
    U8(Vec<u8>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl HostInputs {
    pub fn len(&self) -> usize {
        match self {
            HostInputs::U8(v) => v.len(),
            HostInputs::F32(v) => v.len(),
            HostInputs::F64(v) => v.len(),
        }
    }

    pub fn datatype(&self) -> Option<DataType> {
        match self {
            HostInputs::U8(_) => None,
            HostInputs::F32(_) => Some(DataType::F32),
            HostInputs::F64(_) => Some(DataType::F64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostTargets {
    /// Raw class indices as read from the manifest
    Labels(Vec<usize>),
    /// Row-major [batch, nclasses]
    OneHot { values: Vec<f32>, nclasses: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostBatch {
    pub size:    usize,
    /// [channels, height, width] of one sample; inputs are stored
    /// sample-major in this layout
    pub shape:   [usize; 3],
    pub inputs:  HostInputs,
    pub targets: HostTargets,
}

impl HostBatch {
    pub fn features(&self) -> usize {
        self.shape.iter().product()
    }

    /// Upload to `device`. Inputs must already be floating point and
    /// targets one-hot.
    pub fn into_batch<B: Backend>(self, device: &B::Device) -> Result<Batch<B>> {
        let shape = [self.size, self.features()];
        if self.inputs.len() != shape[0] * shape[1] {
            return Err(Error::config(format!(
                "batch holds {} input values, expected {} x {}",
                self.inputs.len(),
                shape[0],
                shape[1]
            )));
        }
        let inputs = match self.inputs {
            HostInputs::F32(v) => TensorData::new(v, shape),
            HostInputs::F64(v) => TensorData::new(v, shape),
            HostInputs::U8(_) => {
                return Err(Error::config("raw u8 inputs reached the device without a type cast"))
            }
        };
        let targets = match self.targets {
            HostTargets::OneHot { values, nclasses } => TensorData::new(values, [self.size, nclasses]),
            HostTargets::Labels(_) => {
                return Err(Error::config("class labels reached the device without one-hot encoding"))
            }
        };
        Ok(Batch {
            inputs:  Tensor::from_data(inputs, device),
            targets: Tensor::from_data(targets, device),
        })
    }
}

/// A source of host batches; the manifest loader and every transform
/// wrapped around it implement this.
pub trait HostIterator: Send + Sync {
    fn ndata(&self) -> usize;
    fn batch_size(&self) -> usize;
    fn input_shape(&self) -> [usize; 3];
    fn nclasses(&self) -> usize;
    fn host_batches(&self) -> Box<dyn Iterator<Item = Result<HostBatch>> + '_>;
}

/// Presents a host pipeline as a device-side [`DataIterator`].
pub struct DeviceIterator<B: Backend, I: HostIterator> {
    inner:  I,
    device: B::Device,
}

impl<B: Backend, I: HostIterator> DeviceIterator<B, I> {
    pub fn new(inner: I, device: B::Device) -> Self {
        Self { inner, device }
    }
}

impl<B: Backend, I: HostIterator> DataIterator<B> for DeviceIterator<B, I> {
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
        self.inner.nclasses()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Result<Batch<B>>> + '_> {
        Box::new(
            self.inner
                .host_batches()
                .map(move |batch| batch.and_then(|b| b.into_batch(&self.device))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestBackend;

    fn host(inputs: HostInputs, targets: HostTargets) -> HostBatch {
        HostBatch { size: 2, shape: [1, 1, 2], inputs, targets }
    }

    #[test]
    fn uploads_float_inputs_and_one_hot_targets() {
        let batch = host(
            HostInputs::F64(vec![0.0, 1.0, 2.0, 3.0]),
            HostTargets::OneHot { values: vec![1.0, 0.0, 0.0, 1.0], nclasses: 2 },
        )
        .into_batch::<TestBackend>(&Default::default())
        .unwrap();
        assert_eq!(batch.inputs.dims(), [2, 2]);
        assert_eq!(batch.targets.dims(), [2, 2]);
        assert_eq!(batch.size(), 2);
    }

    #[test]
    fn refuses_unconverted_batches() {
        let raw = host(HostInputs::U8(vec![0; 4]), HostTargets::Labels(vec![0, 1]));
        assert!(raw.into_batch::<TestBackend>(&Default::default()).is_err());

        let labels = host(HostInputs::F32(vec![0.0; 4]), HostTargets::Labels(vec![0, 1]));
        assert!(labels.into_batch::<TestBackend>(&Default::default()).is_err());
    }
}
