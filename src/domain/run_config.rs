// ============================================================
// Layer 3 — Run Configuration
// ============================================================
// The resolved, immutable set of parameters for one run.
//
// Every field is resolved independently from four sources,
// highest priority first:
//
//   1. a value passed explicitly on the command line
//   2. a value from the config file (-c/--config)
//   3. a value embedded in the model document
//   4. the built-in default
//
// Only backend, batch size and epochs can come from the model
// document; every other field skips source 3.
//
// "Explicitly passed" is tracked by type: the CLI layer hands
// over a `RunOverrides` whose fields are `Some` only when the
// flag was present, so nothing here ever inspects raw argv.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::document::ModelDocument;
use crate::error::{Error, Result};

pub const DEFAULT_BACKEND:            BackendName     = BackendName::Cpu;
pub const DEFAULT_BATCH_SIZE:         usize           = 128;
pub const DEFAULT_EPOCHS:             usize           = 10;
pub const DEFAULT_DATATYPE:           DataType        = DataType::F32;
pub const DEFAULT_DEVICE_ID:          usize           = 0;
pub const DEFAULT_DATA_DIR:           &str            = "data";
pub const DEFAULT_EVAL_FREQ:          usize           = 1;
pub const DEFAULT_SERIALIZE:          usize           = 0;
pub const DEFAULT_HISTORY:            usize           = 1;
pub const DEFAULT_PROFILE_ITERATIONS: usize           = 50;
pub const DEFAULT_PROFILE_ITER_SKIP:  usize           = 1;
pub const DEFAULT_PROFILING_METHOD:   ProfilingMethod = ProfilingMethod::Time;

// ─── Enumerated settings ─────────────────────────────────────────────────────

/// Which compute backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendName {
    Cpu,
    Gpu,
}

/// Floating point precision of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F16,
    F32,
    F64,
}

/// How benchmark iterations are timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfilingMethod {
    /// Wall clock around the queued work
    Time,
    /// Wall clock after reading the results back to the host
    Sync,
}

/// Rounding applied when storing reduced-precision values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Nearest,
    /// Stochastic rounding keeping `bits` mantissa bits
    Stochastic { bits: u32 },
}

impl From<u32> for RoundingMode {
    fn from(bits: u32) -> Self {
        match bits {
            0 => RoundingMode::Nearest,
            bits => RoundingMode::Stochastic { bits },
        }
    }
}

macro_rules! named_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const NAMES: &'static [&'static str] = &[$($name),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(format!(
                        "invalid value '{other}' (expected one of: {})",
                        Self::NAMES.join(", ")
                    )),
                }
            }
        }
    };
}

named_enum!(BackendName { Cpu => "cpu", Gpu => "gpu" });
named_enum!(DataType { F16 => "f16", F32 => "f32", F64 => "f64" });
named_enum!(ProfilingMethod { Time => "time", Sync => "sync" });

// ─── Unresolved overrides ─────────────────────────────────────────────────────

/// One layer of optional settings: what the user passed on the
/// command line, or what the config file contains.
///
/// Field names match the long CLI option names, which is also
/// the key vocabulary of the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunOverrides {
    pub backend:             Option<BackendName>,
    pub batch_size:          Option<usize>,
    pub epochs:              Option<usize>,
    pub datatype:            Option<DataType>,
    pub rng_seed:            Option<u64>,
    pub device_id:           Option<usize>,
    pub rounding:            Option<u32>,
    pub data_dir:            Option<PathBuf>,
    pub model_file:          Option<PathBuf>,
    pub save_path:           Option<PathBuf>,
    pub serialize:           Option<usize>,
    pub history:             Option<usize>,
    pub output_file:         Option<PathBuf>,
    pub eval_freq:           Option<usize>,
    pub no_progress_bar:     Option<bool>,
    pub profile:             Option<bool>,
    pub profile_inference:   Option<bool>,
    pub profiling_method:    Option<ProfilingMethod>,
    pub profile_iterations:  Option<usize>,
    pub profile_iter_skip:   Option<usize>,
    pub abort_on_data_error: Option<bool>,
}

impl RunOverrides {
    /// Field-wise merge: values set in `self` win over `lower`.
    pub fn over(self, lower: RunOverrides) -> RunOverrides {
        RunOverrides {
            backend:             self.backend.or(lower.backend),
            batch_size:          self.batch_size.or(lower.batch_size),
            epochs:              self.epochs.or(lower.epochs),
            datatype:            self.datatype.or(lower.datatype),
            rng_seed:            self.rng_seed.or(lower.rng_seed),
            device_id:           self.device_id.or(lower.device_id),
            rounding:            self.rounding.or(lower.rounding),
            data_dir:            self.data_dir.or(lower.data_dir),
            model_file:          self.model_file.or(lower.model_file),
            save_path:           self.save_path.or(lower.save_path),
            serialize:           self.serialize.or(lower.serialize),
            history:             self.history.or(lower.history),
            output_file:         self.output_file.or(lower.output_file),
            eval_freq:           self.eval_freq.or(lower.eval_freq),
            no_progress_bar:     self.no_progress_bar.or(lower.no_progress_bar),
            profile:             self.profile.or(lower.profile),
            profile_inference:   self.profile_inference.or(lower.profile_inference),
            profiling_method:    self.profiling_method.or(lower.profiling_method),
            profile_iterations:  self.profile_iterations.or(lower.profile_iterations),
            profile_iter_skip:   self.profile_iter_skip.or(lower.profile_iter_skip),
            abort_on_data_error: self.abort_on_data_error.or(lower.abort_on_data_error),
        }
    }
}

// ─── Resolved configuration ───────────────────────────────────────────────────

/// Settings for the callbacks attached to a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackSettings {
    pub save_path:    Option<PathBuf>,
    /// Checkpoint every N epochs; 0 means only at the end
    pub serialize:    usize,
    /// Number of epoch-tagged checkpoints kept on disk
    pub history:      usize,
    pub output_file:  Option<PathBuf>,
    /// Evaluate every N epochs; 0 disables evaluation
    pub eval_freq:    usize,
    pub progress_bar: bool,
}

/// Settings for a benchmarking pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSettings {
    /// Time only the forward pass
    pub inference:  bool,
    pub method:     ProfilingMethod,
    pub iterations: usize,
    /// Leading iterations left out of the statistics
    pub skip:       usize,
}

/// The two terminal run modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunMode {
    Fit,
    Profile(ProfileSettings),
}

/// Fully resolved run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub backend:             BackendName,
    pub batch_size:          usize,
    pub epochs:              usize,
    pub datatype:            DataType,
    pub rng_seed:            Option<u64>,
    pub device_id:           usize,
    pub rounding:            RoundingMode,
    pub data_dir:            PathBuf,
    pub model_file:          Option<PathBuf>,
    pub callbacks:           CallbackSettings,
    pub profiling:           Option<ProfileSettings>,
    pub abort_on_data_error: bool,
}

impl RunConfig {
    /// Resolve every field from CLI overrides, config-file values,
    /// the model document and the built-in defaults.
    pub fn resolve(
        cli:  &RunOverrides,
        file: &RunOverrides,
        doc:  &ModelDocument,
    ) -> Result<Self> {
        let o = cli.clone().over(file.clone());

        let profiling = if o.profile.unwrap_or(false) || o.profile_inference.unwrap_or(false) {
            Some(ProfileSettings {
                inference:  o.profile_inference.unwrap_or(false),
                method:     o.profiling_method.unwrap_or(DEFAULT_PROFILING_METHOD),
                iterations: o.profile_iterations.unwrap_or(DEFAULT_PROFILE_ITERATIONS),
                skip:       o.profile_iter_skip.unwrap_or(DEFAULT_PROFILE_ITER_SKIP),
            })
        } else {
            None
        };

        let cfg = RunConfig {
            backend:    o.backend.or(doc.backend).unwrap_or(DEFAULT_BACKEND),
            batch_size: o.batch_size.or(doc.batchsize).unwrap_or(DEFAULT_BATCH_SIZE),
            epochs:     o.epochs.or(doc.epochs).unwrap_or(DEFAULT_EPOCHS),
            datatype:   o.datatype.unwrap_or(DEFAULT_DATATYPE),
            rng_seed:   o.rng_seed,
            device_id:  o.device_id.unwrap_or(DEFAULT_DEVICE_ID),
            rounding:   RoundingMode::from(o.rounding.unwrap_or(0)),
            data_dir:   o.data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            model_file: o.model_file,
            callbacks:  CallbackSettings {
                save_path:    o.save_path,
                serialize:    o.serialize.unwrap_or(DEFAULT_SERIALIZE),
                history:      o.history.unwrap_or(DEFAULT_HISTORY),
                output_file:  o.output_file,
                eval_freq:    o.eval_freq.unwrap_or(DEFAULT_EVAL_FREQ),
                progress_bar: !o.no_progress_bar.unwrap_or(false),
            },
            profiling,
            abort_on_data_error: o.abort_on_data_error.unwrap_or(false),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch size must be > 0"));
        }
        if self.callbacks.history == 0 {
            return Err(Error::config("history must be >= 1"));
        }
        if let Some(p) = &self.profiling {
            if p.iterations == 0 {
                return Err(Error::config("profile_iterations must be > 0"));
            }
            if p.skip >= p.iterations {
                return Err(Error::config(format!(
                    "profile_iter_skip ({}) must be smaller than profile_iterations ({})",
                    p.skip, p.iterations
                )));
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> RunMode {
        match self.profiling {
            Some(settings) => RunMode::Profile(settings),
            None => RunMode::Fit,
        }
    }
}
