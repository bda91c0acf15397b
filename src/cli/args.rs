// ============================================================
// Layer 1 — CLI Arguments
// ============================================================
// Every run option, named the way the config file names it.
// None of them carry a clap default: an option that is not
// given stays `None` so the config file and the model document
// can still supply it. Defaults are applied by the resolver.

use std::path::PathBuf;

use clap::{ArgAction, Args};

use crate::domain::run_config::{BackendName, DataType, ProfilingMethod, RunOverrides};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Compute backend
    #[arg(short = 'b', long)]
    pub backend: Option<BackendName>,

    /// Device ordinal for the gpu backend
    #[arg(short = 'i', long = "device_id")]
    pub device_id: Option<usize>,

    /// Seed for parameter init and data shuffling
    #[arg(short = 'r', long = "rng_seed")]
    pub rng_seed: Option<u64>,

    /// Number of training epochs
    #[arg(short = 'e', long)]
    pub epochs: Option<usize>,

    /// Minibatch size
    #[arg(short = 'z', long = "batch_size")]
    pub batch_size: Option<usize>,

    /// Backend floating point precision
    #[arg(short = 'd', long)]
    pub datatype: Option<DataType>,

    /// Mantissa bits kept by stochastic rounding (0 rounds to nearest)
    #[arg(long)]
    pub rounding: Option<u32>,

    /// Directory holding the datasets
    #[arg(short = 'w', long = "data_dir")]
    pub data_dir: Option<PathBuf>,

    /// Checkpoint to load parameters and epoch count from
    #[arg(long = "model_file")]
    pub model_file: Option<PathBuf>,

    /// Where to write checkpoints
    #[arg(short = 's', long = "save_path")]
    pub save_path: Option<PathBuf>,

    /// Checkpoint every N epochs (0 saves only at the end)
    #[arg(long)]
    pub serialize: Option<usize>,

    /// Number of epoch-tagged checkpoints to keep
    #[arg(short = 'H', long)]
    pub history: Option<usize>,

    /// Per-epoch metrics CSV
    #[arg(short = 'o', long = "output_file")]
    pub output_file: Option<PathBuf>,

    /// Evaluate on the test set every N epochs (0 disables)
    #[arg(long = "eval_freq")]
    pub eval_freq: Option<usize>,

    /// Disable the progress bar
    #[arg(long = "no_progress_bar")]
    pub no_progress_bar: bool,

    /// Benchmark training iterations instead of fitting
    #[arg(short = 'p', long)]
    pub profile: bool,

    /// Benchmark the forward pass only
    #[arg(long = "profile_inference")]
    pub profile_inference: bool,

    /// How benchmark phases are timed
    #[arg(long = "profiling_method")]
    pub profiling_method: Option<ProfilingMethod>,

    /// Number of benchmark iterations
    #[arg(long = "profile_iterations")]
    pub profile_iterations: Option<usize>,

    /// Leading benchmark iterations left out of the statistics
    #[arg(long = "profile_iter_skip")]
    pub profile_iter_skip: Option<usize>,

    /// Exit with status 1 if the image manifest data cannot be set up
    #[arg(long = "abort_on_data_error")]
    pub abort_on_data_error: bool,
}

/// Switches only count as given when present, so a config file
/// can still turn them on.
fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl From<&RunArgs> for RunOverrides {
    fn from(a: &RunArgs) -> Self {
        RunOverrides {
            backend:             a.backend,
            batch_size:          a.batch_size,
            epochs:              a.epochs,
            datatype:            a.datatype,
            rng_seed:            a.rng_seed,
            device_id:           a.device_id,
            rounding:            a.rounding,
            data_dir:            a.data_dir.clone(),
            model_file:          a.model_file.clone(),
            save_path:           a.save_path.clone(),
            serialize:           a.serialize,
            history:             a.history,
            output_file:         a.output_file.clone(),
            eval_freq:           a.eval_freq,
            no_progress_bar:     flag(a.no_progress_bar),
            profile:             flag(a.profile),
            profile_inference:   flag(a.profile_inference),
            profiling_method:    a.profiling_method,
            profile_iterations:  a.profile_iterations,
            profile_iter_skip:   a.profile_iter_skip,
            abort_on_data_error: flag(a.abort_on_data_error),
        }
    }
}

/// Logging options; consumed by `main` before anything else runs.
#[derive(Args, Debug, Default)]
pub struct LogArgs {
    /// Write log output to FILE instead of stderr
    #[arg(short = 'l', long = "log")]
    pub log: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}
