// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands a plain
// `RunRequest` to the application layer. The only output this
// layer produces itself is the final summary on stdout.
//
//   modelrun model.yaml -e 5 -s out/model -o out/metrics.csv
//   modelrun model.yaml -p --profiling_method sync

pub mod args;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::application::run_use_case::{RunOutcome, RunRequest, RunUseCase};
use args::{LogArgs, RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "modelrun",
    version,
    about = "Train or benchmark a neural network described by a YAML model document."
)]
pub struct Cli {
    /// YAML model description document
    #[arg(value_name = "CONFIG")]
    pub document: PathBuf,

    /// YAML file of option values (keys are the long option names)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub options: RunArgs,

    #[command(flatten)]
    pub logging: LogArgs,
}

impl Cli {
    pub fn request(&self) -> RunRequest {
        RunRequest {
            document:    self.document.clone(),
            config_file: self.config.clone(),
            overrides:   (&self.options).into(),
        }
    }

    pub fn run(self) -> Result<()> {
        match RunUseCase::new(self.request()).execute()? {
            RunOutcome::Trained(state) => {
                print!("Finished {} epochs, train cost {:.4}", state.epoch, state.train_cost);
                match state.eval {
                    Some(eval) => println!(
                        ", eval cost {:.4}, misclassification {:.2}%",
                        eval.cost,
                        eval.misclass * 100.0
                    ),
                    None => println!(),
                }
            }
            RunOutcome::Profiled(report) => print!("{report}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run_config::{BackendName, DataType, ProfilingMethod, RunOverrides};

    #[test]
    fn short_and_long_options_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "modelrun", "model.yaml", "-b", "gpu", "-z", "32", "-e", "3", "-d", "f64", "-H", "4",
            "--eval_freq", "2", "--no_progress_bar", "--profiling_method", "sync", "-w", "data",
        ])
        .unwrap();
        let request = cli.request();
        assert_eq!(request.document, PathBuf::from("model.yaml"));
        let o = request.overrides;
        assert_eq!(o.backend, Some(BackendName::Gpu));
        assert_eq!(o.batch_size, Some(32));
        assert_eq!(o.epochs, Some(3));
        assert_eq!(o.datatype, Some(DataType::F64));
        assert_eq!(o.history, Some(4));
        assert_eq!(o.eval_freq, Some(2));
        assert_eq!(o.no_progress_bar, Some(true));
        assert_eq!(o.profiling_method, Some(ProfilingMethod::Sync));
        assert_eq!(o.data_dir, Some(PathBuf::from("data")));
    }

    #[test]
    fn absent_options_stay_unset() {
        let cli = Cli::try_parse_from(["modelrun", "model.yaml"]).unwrap();
        assert_eq!(cli.request().overrides, RunOverrides::default());
        assert_eq!(cli.logging.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn verbosity_counts_and_log_file() {
        let cli = Cli::try_parse_from(["modelrun", "m.yaml", "-vvv", "-l", "run.log", "-c", "run.yaml"]).unwrap();
        assert_eq!(cli.logging.verbose, 3);
        assert_eq!(cli.logging.log, Some(PathBuf::from("run.log")));
        assert_eq!(cli.config, Some(PathBuf::from("run.yaml")));
    }

    #[test]
    fn rejects_bad_values_and_missing_document() {
        assert!(Cli::try_parse_from(["modelrun", "m.yaml", "-b", "tpu"]).is_err());
        assert!(Cli::try_parse_from(["modelrun", "m.yaml", "-z", "many"]).is_err());
        assert!(Cli::try_parse_from(["modelrun"]).is_err());
    }
}
