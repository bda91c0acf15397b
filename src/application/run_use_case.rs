// ============================================================
// Layer 2 — RunUseCase
// ============================================================
// One invocation of the tool, in order:
//
//   Step 1: Read the model document          (Layer 3 - domain)
//   Step 2: Read the optional config file    (Layer 6 - infra)
//   Step 3: Resolve the run configuration    (Layer 3 - domain)
//   Step 4: Parse the dataset block          (Layer 3 - domain)
//   Step 5: Build the backend                (Layer 5 - ml)
//   Step 6: Build model, cost, optimizer     (Layer 5 - ml)
//   Step 7: Build the data iterators         (Layer 4 - data)
//   Step 8: Fit, or benchmark when profiling (Layer 5 - ml)
//
// Step 4 comes before step 5 so a document without a dataset
// fails before any device is touched.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::data::loader::load_data;
use crate::domain::{
    dataset_spec::DatasetSpec,
    document::ModelDocument,
    run_config::{RunConfig, RunMode, RunOverrides},
};
use crate::infra::config_file;
use crate::ml::{
    backend::{gen_backend, BackendContext, BackendSpec, BackendTask},
    benchmark::{benchmark, BenchmarkReport},
    builder::{create_objects, ModelObjects},
    callbacks::{build_callbacks, FitState},
    trainer::fit,
};

/// What the presentation layer asks for.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub document:    PathBuf,
    pub config_file: Option<PathBuf>,
    /// Options given on the command line
    pub overrides:   RunOverrides,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// State after the last epoch
    Trained(FitState),
    Profiled(BenchmarkReport),
}

pub struct RunUseCase {
    request: RunRequest,
}

impl RunUseCase {
    pub fn new(request: RunRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<RunOutcome> {
        let req = &self.request;

        // ── Steps 1-3: configuration ─────────────────────────────────────────
        let doc = ModelDocument::load(&req.document)?;
        let file = match &req.config_file {
            Some(path) => config_file::load_overrides(path)?,
            None => RunOverrides::default(),
        };
        let cfg = RunConfig::resolve(&req.overrides, &file, &doc)?;
        tracing::debug!("Resolved run configuration: {:?}", cfg);

        // ── Step 4: dataset block ────────────────────────────────────────────
        let dataset = DatasetSpec::parse(doc.dataset.as_ref())?;

        // ── Steps 5-8 run against the selected backend ───────────────────────
        let spec = BackendSpec::from(&cfg);
        tracing::info!(
            "Using {} backend ({}), batch size {}",
            spec.name,
            spec.datatype,
            spec.batch_size
        );
        gen_backend(&spec, RunTask { doc: &doc, cfg: &cfg, dataset: &dataset })
    }
}

struct RunTask<'a> {
    doc:     &'a ModelDocument,
    cfg:     &'a RunConfig,
    dataset: &'a DatasetSpec,
}

impl BackendTask for RunTask<'_> {
    type Output = RunOutcome;

    fn run<B: AutodiffBackend>(self, backend: BackendContext<B>) -> Result<RunOutcome> {
        let ModelObjects { mut model, cost, mut optimizer } = create_objects(self.doc, self.cfg, &backend)?;
        let data = load_data(self.dataset, self.cfg, &backend)
            .with_context(|| format!("Failed to load dataset '{}'", self.dataset.name))?;

        match self.cfg.mode() {
            RunMode::Profile(settings) => {
                let report = benchmark(&model, &optimizer, &cost, data.train.as_ref(), settings)?;
                Ok(RunOutcome::Profiled(report))
            }
            RunMode::Fit => {
                let mut callbacks = build_callbacks(&self.cfg.callbacks, data.test.as_ref(), cost)?;
                let state = fit(
                    &mut model,
                    data.train.as_ref(),
                    &mut optimizer,
                    &cost,
                    self.cfg.epochs,
                    &mut callbacks,
                )?;
                Ok(RunOutcome::Trained(state))
            }
        }
    }
}
