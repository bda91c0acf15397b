// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per training epoch:
//
//   epoch,train_cost,eval_cost,misclass
//   1,0.912345,0.701234,0.213
//   2,0.654321,,
//
// Evaluation columns stay empty for epochs that were not
// evaluated. The header is written only when the file is new,
// so a resumed run keeps extending the same log.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;

const HEADER: [&str; 4] = ["epoch", "train_cost", "eval_cost", "misclass"];

/// One row of the metrics log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch:      usize,
    /// Mean training cost over the epoch's minibatches
    pub train_cost: f64,
    pub eval_cost:  Option<f64>,
    /// Fraction of misclassified evaluation samples
    pub misclass:   Option<f64>,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
    csv:      Writer<File>,
}

impl MetricsLogger {
    /// Open `path` for appending, creating it (and its directory)
    /// with a header row if it does not exist yet.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let csv_path = path.as_ref().to_path_buf();
        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create directory '{}'", dir.display()))?;
        }

        let is_new = !csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open metrics file '{}'", csv_path.display()))?;
        let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            csv.write_record(HEADER)?;
            csv.flush()?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path, csv })
    }

    pub fn log(&mut self, m: &EpochMetrics) -> Result<()> {
        self.csv
            .serialize(m)
            .with_context(|| format!("Cannot write to metrics file '{}'", self.csv_path.display()))?;
        self.csv.flush()?;
        tracing::debug!("Logged epoch {} metrics: train_cost={:.4}", m.epoch, m.train_cost);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
