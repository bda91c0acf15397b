// ============================================================
// Layer 5 — Training Callbacks
// ============================================================
// Hooks run by the fit loop at train / epoch / minibatch
// boundaries. Built from the callback settings in this order:
//
//   evaluation   (every eval_freq epochs, fills state.eval)
//   checkpoint   (every `serialize` epochs and at the end)
//   metrics CSV  (one row per epoch)
//   progress bar (per-epoch bar over the minibatches)
//
// Evaluation runs first so the later callbacks see its result
// for the same epoch.

use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::batch::DataIterator;
use crate::domain::run_config::CallbackSettings;
use crate::infra::{
    checkpoint::Checkpoint,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{cost::Cost, model::Model};

/// Evaluation result for one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalMetrics {
    pub cost:     f64,
    /// Fraction of samples whose arg-max prediction is wrong
    pub misclass: f64,
}

/// What the fit loop shares with its callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct FitState {
    /// 1-based epoch currently running or just finished
    pub epoch:        usize,
    pub total_epochs: usize,
    pub nbatches:     usize,
    /// Minibatches finished in the current epoch
    pub batch:        usize,
    pub batch_cost:   f64,
    /// Running mean over the current epoch
    pub train_cost:   f64,
    pub eval:         Option<EvalMetrics>,
}

impl FitState {
    pub fn new(start_epoch: usize, total_epochs: usize, nbatches: usize) -> Self {
        Self {
            epoch: start_epoch,
            total_epochs,
            nbatches,
            batch: 0,
            batch_cost: 0.0,
            train_cost: 0.0,
            eval: None,
        }
    }
}

#[allow(unused_variables)]
pub trait Callback<B: AutodiffBackend> {
    fn on_train_begin(&mut self, state: &FitState, model: &Model<B>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_begin(&mut self, state: &FitState, model: &Model<B>) -> Result<()> {
        Ok(())
    }

    fn on_minibatch_end(&mut self, state: &FitState, model: &Model<B>) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, state: &mut FitState, model: &Model<B>) -> Result<()> {
        Ok(())
    }

    fn on_train_end(&mut self, state: &FitState, model: &Model<B>) -> Result<()> {
        Ok(())
    }
}

/// The callbacks the settings ask for, in execution order.
pub fn build_callbacks<'a, B: AutodiffBackend>(
    settings: &CallbackSettings,
    test:     &'a dyn DataIterator<B>,
    cost:     Cost,
) -> Result<Vec<Box<dyn Callback<B> + 'a>>> {
    let mut callbacks: Vec<Box<dyn Callback<B> + 'a>> = Vec::new();
    if settings.eval_freq > 0 {
        callbacks.push(Box::new(EvalCallback { data: test, cost, freq: settings.eval_freq }));
    }
    if let Some(path) = &settings.save_path {
        callbacks.push(Box::new(CheckpointCallback::new(
            path.clone(),
            settings.serialize,
            settings.history,
        )));
    }
    if let Some(path) = &settings.output_file {
        let logger = MetricsLogger::new(path)?;
        tracing::info!("Logging epoch metrics to '{}'", logger.csv_path().display());
        callbacks.push(Box::new(MetricsCallback { logger }));
    }
    if settings.progress_bar {
        callbacks.push(Box::new(ProgressCallback { bar: None }));
    }
    Ok(callbacks)
}

// ─── Evaluation ───────────────────────────────────────────────────────────────

/// Mean cost and misclassification rate of `model` over one pass of `data`.
pub fn evaluate<B: AutodiffBackend>(
    model: &Model<B>,
    data:  &dyn DataIterator<B>,
    cost:  &Cost,
) -> Result<EvalMetrics> {
    // inference view: no autodiff graph, dropout off
    let network = model.network()?.valid();

    let mut cost_sum = 0.0;
    let mut batches = 0usize;
    let mut wrong = 0usize;
    let mut seen = 0usize;
    for batch in data.batches() {
        let batch = batch?;
        seen += batch.size();
        let outputs = network.forward(batch.inputs.inner());
        let targets = batch.targets.inner();

        wrong += Cost::misclassified(outputs.clone(), targets.clone());
        cost_sum += cost.get_cost(outputs, targets).into_scalar().elem::<f64>();
        batches += 1;
    }
    anyhow::ensure!(seen > 0, "evaluation data is empty");

    Ok(EvalMetrics {
        cost:     cost_sum / batches as f64,
        misclass: wrong as f64 / seen as f64,
    })
}

struct EvalCallback<'a, B: AutodiffBackend> {
    data: &'a dyn DataIterator<B>,
    cost: Cost,
    freq: usize,
}

impl<B: AutodiffBackend> Callback<B> for EvalCallback<'_, B> {
    fn on_epoch_end(&mut self, state: &mut FitState, model: &Model<B>) -> Result<()> {
        if state.epoch % self.freq == 0 {
            let metrics = evaluate(model, self.data, &self.cost)?;
            tracing::info!(
                "Epoch {} eval: cost={:.4} misclass={:.2}%",
                state.epoch,
                metrics.cost,
                metrics.misclass * 100.0
            );
            state.eval = Some(metrics);
        }
        Ok(())
    }
}

// ─── Checkpointing ────────────────────────────────────────────────────────────

/// Saves to `path` every `serialize` epochs (0: only at the end).
/// With `history` > 1 each save also leaves an epoch-tagged copy,
/// and only the newest `history` copies are kept.
pub struct CheckpointCallback {
    path:       PathBuf,
    serialize:  usize,
    history:    usize,
    snapshots:  VecDeque<Checkpoint>,
    last_saved: Option<usize>,
}

impl CheckpointCallback {
    pub fn new(path: PathBuf, serialize: usize, history: usize) -> Self {
        // tagged copies left by an earlier run count toward `history`
        let snapshots = if history > 1 { existing_snapshots(&path) } else { VecDeque::new() };
        Self {
            path,
            serialize,
            history,
            snapshots,
            last_saved: None,
        }
    }

    fn save<B: AutodiffBackend>(&mut self, model: &Model<B>, epoch: usize) -> Result<()> {
        model
            .save_params(&self.path, epoch)
            .with_context(|| format!("Failed to save checkpoint after epoch {epoch}"))?;
        self.last_saved = Some(epoch);
        tracing::info!("Checkpoint saved to '{}' (epoch {})", self.path.display(), epoch);

        if self.history > 1 {
            let tagged = tagged_snapshot(&self.path, epoch);
            model.save_params(tagged.stem(), epoch)?;
            if !self.snapshots.contains(&tagged) {
                self.snapshots.push_back(tagged);
            }
            while self.snapshots.len() > self.history {
                if let Some(old) = self.snapshots.pop_front() {
                    old.remove()?;
                    tracing::debug!("Removed old checkpoint '{}'", old.stem().display());
                }
            }
        }
        Ok(())
    }
}

/// `<stem>_e<epoch>` next to the main checkpoint.
fn tagged_snapshot(path: &Path, epoch: usize) -> Checkpoint {
    let mut name = Checkpoint::new(path).stem().as_os_str().to_owned();
    name.push(format!("_e{epoch}"));
    Checkpoint::new(Path::new(&name))
}

/// Tagged snapshots of `path` already on disk, oldest epoch first.
fn existing_snapshots(path: &Path) -> VecDeque<Checkpoint> {
    let main = Checkpoint::new(path);
    let stem = main.stem();
    let Some(name) = stem.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return VecDeque::new();
    };
    let dir = stem.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let Ok(entries) = fs::read_dir(dir) else {
        return VecDeque::new();
    };

    let prefix = format!("{name}_e");
    let mut epochs: Vec<usize> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let file = entry.file_name().to_string_lossy().into_owned();
            file.strip_prefix(&prefix)?.strip_suffix(".json")?.parse().ok()
        })
        .collect();
    epochs.sort_unstable();
    if !epochs.is_empty() {
        tracing::debug!("Found {} earlier snapshots of '{}'", epochs.len(), stem.display());
    }
    epochs.into_iter().map(|epoch| tagged_snapshot(path, epoch)).collect()
}

impl<B: AutodiffBackend> Callback<B> for CheckpointCallback {
    fn on_epoch_end(&mut self, state: &mut FitState, model: &Model<B>) -> Result<()> {
        if self.serialize > 0 && state.epoch % self.serialize == 0 {
            self.save(model, state.epoch)?;
        }
        Ok(())
    }

    fn on_train_end(&mut self, _state: &FitState, model: &Model<B>) -> Result<()> {
        let epoch = model.epoch_index();
        if self.last_saved != Some(epoch) && model.is_initialized() {
            self.save(model, epoch)?;
        }
        Ok(())
    }
}

// ─── Metrics CSV ──────────────────────────────────────────────────────────────

struct MetricsCallback {
    logger: MetricsLogger,
}

impl<B: AutodiffBackend> Callback<B> for MetricsCallback {
    fn on_epoch_end(&mut self, state: &mut FitState, _model: &Model<B>) -> Result<()> {
        self.logger.log(&EpochMetrics {
            epoch:      state.epoch,
            train_cost: state.train_cost,
            eval_cost:  state.eval.map(|e| e.cost),
            misclass:   state.eval.map(|e| e.misclass),
        })
    }
}

// ─── Progress bar ─────────────────────────────────────────────────────────────

struct ProgressCallback {
    bar: Option<ProgressBar>,
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl<B: AutodiffBackend> Callback<B> for ProgressCallback {
    fn on_epoch_begin(&mut self, state: &FitState, _model: &Model<B>) -> Result<()> {
        let bar = ProgressBar::new(state.nbatches as u64);
        bar.set_style(progress_style());
        bar.set_message(format!("epoch {}/{}", state.epoch, state.total_epochs));
        self.bar = Some(bar);
        Ok(())
    }

    fn on_minibatch_end(&mut self, state: &FitState, _model: &Model<B>) -> Result<()> {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(format!(
                "epoch {}/{} cost {:.4}",
                state.epoch, state.total_epochs, state.train_cost
            ));
        }
        Ok(())
    }

    fn on_epoch_end(&mut self, state: &mut FitState, _model: &Model<B>) -> Result<()> {
        if let Some(bar) = self.bar.take() {
            let eval = state
                .eval
                .map(|e| format!(" eval {:.4} ({:.2}% wrong)", e.cost, e.misclass * 100.0))
                .unwrap_or_default();
            bar.finish_with_message(format!(
                "epoch {}/{} cost {:.4}{eval}",
                state.epoch, state.total_epochs, state.train_cost
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model_spec::{Activation, LayerSpec};
    use crate::test_support::{scratch_dir, TestBackend};

    fn model() -> Model<TestBackend> {
        let layers = vec![LayerSpec::Linear { nout: 2, activation: Activation::Softmax, bias: true }];
        let mut model = Model::new(layers, Default::default());
        model.initialize(3).unwrap();
        model
    }

    #[test]
    fn checkpoints_on_schedule_and_prunes_history() {
        let dir = scratch_dir("callback-history");
        let mut callback = CheckpointCallback::new(dir.join("run"), 1, 2);
        let mut model = model();

        for epoch in 1..=3 {
            model.set_epoch_index(epoch);
            let mut state = FitState::new(epoch, 3, 1);
            Callback::<TestBackend>::on_epoch_end(&mut callback, &mut state, &model).unwrap();
        }
        Callback::<TestBackend>::on_train_end(&mut callback, &FitState::new(3, 3, 1), &model).unwrap();

        assert!(Checkpoint::new(&dir.join("run")).exists());
        assert!(!Checkpoint::new(&dir.join("run_e1")).exists());
        assert!(Checkpoint::new(&dir.join("run_e2")).exists());
        assert!(Checkpoint::new(&dir.join("run_e3")).exists());
        assert_eq!(Checkpoint::new(&dir.join("run")).load_meta().unwrap().epoch, 3);
    }

    #[test]
    fn dotted_save_path_keeps_main_checkpoint() {
        let dir = scratch_dir("callback-dotted");
        let mut callback = CheckpointCallback::new(dir.join("model.ckpt"), 1, 2);
        let mut model = model();

        for epoch in 1..=3 {
            model.set_epoch_index(epoch);
            let mut state = FitState::new(epoch, 3, 1);
            Callback::<TestBackend>::on_epoch_end(&mut callback, &mut state, &model).unwrap();
        }
        Callback::<TestBackend>::on_train_end(&mut callback, &FitState::new(3, 3, 1), &model).unwrap();

        let main = Checkpoint::new(&dir.join("model.ckpt"));
        assert!(main.exists());
        assert_eq!(main.load_meta().unwrap().epoch, 3);
        assert!(!Checkpoint::new(&dir.join("model.ckpt_e1")).exists());
        assert!(Checkpoint::new(&dir.join("model.ckpt_e2")).exists());
        assert!(Checkpoint::new(&dir.join("model.ckpt_e3")).exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 6);
    }

    #[test]
    fn history_counts_snapshots_from_an_earlier_run() {
        let dir = scratch_dir("callback-history-resume");
        let mut model = model();

        let mut first = CheckpointCallback::new(dir.join("run"), 1, 2);
        for epoch in 1..=3 {
            model.set_epoch_index(epoch);
            Callback::<TestBackend>::on_epoch_end(&mut first, &mut FitState::new(epoch, 3, 1), &model).unwrap();
        }

        // a resumed run picks up e2 and e3 and prunes e2 on its first save
        let mut resumed = CheckpointCallback::new(dir.join("run"), 1, 2);
        model.set_epoch_index(4);
        Callback::<TestBackend>::on_epoch_end(&mut resumed, &mut FitState::new(4, 4, 1), &model).unwrap();

        assert!(!Checkpoint::new(&dir.join("run_e2")).exists());
        assert!(Checkpoint::new(&dir.join("run_e3")).exists());
        assert!(Checkpoint::new(&dir.join("run_e4")).exists());
    }

    #[test]
    fn serialize_zero_saves_only_at_the_end() {
        let dir = scratch_dir("callback-end-only");
        let mut callback = CheckpointCallback::new(dir.join("final"), 0, 1);
        let mut model = model();
        model.set_epoch_index(1);

        let mut state = FitState::new(1, 2, 1);
        Callback::<TestBackend>::on_epoch_end(&mut callback, &mut state, &model).unwrap();
        assert!(!Checkpoint::new(&dir.join("final")).exists());

        model.set_epoch_index(2);
        Callback::<TestBackend>::on_train_end(&mut callback, &state, &model).unwrap();
        assert_eq!(Checkpoint::new(&dir.join("final")).load_meta().unwrap().epoch, 2);
    }

    #[test]
    fn settings_select_callbacks() {
        struct Empty;
        impl DataIterator<TestBackend> for Empty {
            fn ndata(&self) -> usize { 0 }
            fn batch_size(&self) -> usize { 1 }
            fn input_shape(&self) -> [usize; 3] { [1, 1, 1] }
            fn nclasses(&self) -> usize { 1 }
            fn batches(&self) -> Box<dyn Iterator<Item = crate::error::Result<crate::data::batch::Batch<TestBackend>>> + '_> {
                Box::new(std::iter::empty())
            }
        }

        let mut settings = CallbackSettings {
            save_path:    None,
            serialize:    0,
            history:      1,
            output_file:  None,
            eval_freq:    0,
            progress_bar: false,
        };
        let cost = Cost::new(crate::domain::model_spec::CostSpec::SumSquared);
        assert!(build_callbacks(&settings, &Empty, cost).unwrap().is_empty());

        settings.eval_freq = 2;
        settings.progress_bar = true;
        settings.save_path = Some(scratch_dir("callback-select").join("ck"));
        assert_eq!(build_callbacks(&settings, &Empty, cost).unwrap().len(), 3);
    }
}
