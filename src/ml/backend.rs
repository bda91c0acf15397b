// ============================================================
// Layer 5 — Backend Initializer
// ============================================================
// Turns the runtime backend name + precision into one concrete
// Burn backend type and device, seeds it, and runs the rest of
// the pipeline against it.
//
// Burn backends are types, not values, so the selection is a
// `match` that monomorphises a `BackendTask` once per supported
// combination:
//
//   cpu + f32 → Autodiff<NdArray<f32>>
//   cpu + f64 → Autodiff<NdArray<f64>>
//   gpu + f32 → Autodiff<Wgpu>   on DiscreteGpu(device_id)
//
// Anything else is a backend error. The task receives the one
// `BackendContext` of the run and borrows it everywhere else.

use std::panic::{self, AssertUnwindSafe};

use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use crate::domain::run_config::{BackendName, DataType, RoundingMode, RunConfig};
use crate::error::Error;

/// Everything the initializer needs to build a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    pub name:       BackendName,
    pub datatype:   DataType,
    pub rng_seed:   Option<u64>,
    pub device_id:  usize,
    pub batch_size: usize,
    pub rounding:   RoundingMode,
}

impl From<&RunConfig> for BackendSpec {
    fn from(cfg: &RunConfig) -> Self {
        Self {
            name:       cfg.backend,
            datatype:   cfg.datatype,
            rng_seed:   cfg.rng_seed,
            device_id:  cfg.device_id,
            batch_size: cfg.batch_size,
            rounding:   cfg.rounding,
        }
    }
}

/// The initialized backend: a device of backend type `B` plus the
/// parameters it was built from.
#[derive(Debug, Clone)]
pub struct BackendContext<B: Backend> {
    pub device: B::Device,
    pub spec:   BackendSpec,
}

impl<B: Backend> BackendContext<B> {
    pub fn new(device: B::Device, spec: BackendSpec) -> Self {
        Self { device, spec }
    }

    pub fn batch_size(&self) -> usize {
        self.spec.batch_size
    }
}

/// Work that runs against whichever backend a `BackendSpec` selects.
pub trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, backend: BackendContext<B>) -> anyhow::Result<Self::Output>;
}

type CpuF32 = Autodiff<NdArray<f32>>;
type CpuF64 = Autodiff<NdArray<f64>>;
type GpuF32 = Autodiff<Wgpu>;

/// Build the backend described by `spec` and run `task` on it.
pub fn gen_backend<T: BackendTask>(spec: &BackendSpec, task: T) -> anyhow::Result<T::Output> {
    match (spec.name, spec.datatype) {
        (BackendName::Cpu, DataType::F32) => {
            if spec.device_id != 0 {
                tracing::debug!("device id {} ignored by the cpu backend", spec.device_id);
            }
            task.run(init::<CpuF32>(NdArrayDevice::Cpu, spec)?)
        }
        (BackendName::Cpu, DataType::F64) => task.run(init::<CpuF64>(NdArrayDevice::Cpu, spec)?),
        (BackendName::Gpu, DataType::F32) => {
            task.run(init::<GpuF32>(WgpuDevice::DiscreteGpu(spec.device_id), spec)?)
        }
        (name, datatype) => Err(Error::backend(format!(
            "the {name} backend does not support datatype {datatype}"
        ))
        .into()),
    }
}

fn init<B: AutodiffBackend>(
    device: B::Device,
    spec:   &BackendSpec,
) -> Result<BackendContext<B>, Error> {
    if let RoundingMode::Stochastic { bits } = spec.rounding {
        tracing::warn!(
            "stochastic rounding ({bits} bits) only applies to f16; ignored for {}",
            spec.datatype
        );
    }
    if let Some(seed) = spec.rng_seed {
        B::seed(seed);
    }
    check_device::<B>(&device)?;
    tracing::info!(
        "Backend ready: {} {} on {:?} (batch size {})",
        spec.name,
        spec.datatype,
        device,
        spec.batch_size
    );
    Ok(BackendContext::new(device, spec.clone()))
}

/// Allocate and read back one element so a device that cannot be
/// brought up fails here instead of in the middle of the run.
fn check_device<B: Backend>(device: &B::Device) -> Result<(), Error> {
    let device = device.clone();
    panic::catch_unwind(AssertUnwindSafe(move || {
        let _ = Tensor::<B, 1>::zeros([1], &device).into_data();
    }))
    .map_err(|_| Error::backend("device initialization failed"))
}
