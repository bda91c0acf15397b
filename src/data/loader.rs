// ============================================================
// Layer 4 — Data Loader
// ============================================================
// Turns the `dataset` block into a (train, test) pair of data
// iterators on the run's device. Two paths:
//
//   registered name (MNIST, CIFAR10, ...)
//       registry constructor → in-memory splits
//       → Burn DataLoader + ImageBatcher
//
//   i1k
//       train-index.csv / val-index.csv under the data dir
//       → ManifestLoader → OneHot(1000) → TypeCast → MeanSubtract
//
// Manifest failures propagate like any other error unless the
// run asked to abort on data errors, in which case the process
// exits with status 1 after logging the cause.

use std::path::Path;

use burn::prelude::*;
use serde_yaml::{Mapping, Value};

use crate::data::{
    batch::{DataIterator, DeviceIterator},
    batcher::LoaderIterator,
    manifest::{ManifestConfig, ManifestLoader},
    registry,
    transforms::{MeanSubtract, OneHot, TypeCast, Wrap, BGR_MEANS},
};
use crate::domain::{dataset_spec::DatasetSpec, run_config::RunConfig};
use crate::error::Result;
use crate::ml::backend::BackendContext;

/// Dataset name routed to the manifest loader.
pub const MANIFEST_DATASET: &str = "i1k";
pub const MANIFEST_CLASSES: usize = 1000;
pub const TRAIN_MANIFEST:   &str = "train-index.csv";
pub const TEST_MANIFEST:    &str = "val-index.csv";

pub struct DataIterators<B: Backend> {
    pub train: Box<dyn DataIterator<B>>,
    pub test:  Box<dyn DataIterator<B>>,
}

pub fn load_data<B: Backend>(
    dataset: &DatasetSpec,
    cfg:     &RunConfig,
    backend: &BackendContext<B>,
) -> Result<DataIterators<B>> {
    if dataset.name.eq_ignore_ascii_case(MANIFEST_DATASET) {
        match load_manifest_data(dataset, cfg, backend) {
            Err(e) if cfg.abort_on_data_error => {
                tracing::error!("Failed to set up the {} data: {}", dataset.name, e);
                std::process::exit(1);
            }
            other => other,
        }
    } else {
        load_registered(dataset, cfg, backend)
    }
}

fn load_registered<B: Backend>(
    dataset: &DatasetSpec,
    cfg:     &RunConfig,
    backend: &BackendContext<B>,
) -> Result<DataIterators<B>> {
    let constructor = registry::lookup(&dataset.name)?;
    if !dataset.train_config.is_empty() || !dataset.test_config.is_empty() {
        tracing::debug!("{}: train_config/test_config ignored for registered datasets", dataset.name);
    }

    let splits = constructor(&cfg.data_dir)?;
    let seed = cfg.rng_seed.unwrap_or_else(rand::random);
    let batch_size = backend.batch_size();

    tracing::info!(
        "Loaded {}: {} train / {} test samples",
        dataset.name,
        burn::data::dataset::Dataset::len(&splits.train),
        burn::data::dataset::Dataset::len(&splits.test)
    );
    Ok(DataIterators {
        train: Box::new(LoaderIterator::new(splits.train, batch_size, Some(seed), &backend.device)),
        test:  Box::new(LoaderIterator::new(splits.test, batch_size, None, &backend.device)),
    })
}

fn load_manifest_data<B: Backend>(
    dataset: &DatasetSpec,
    cfg:     &RunConfig,
    backend: &BackendContext<B>,
) -> Result<DataIterators<B>> {
    let batch_size = backend.batch_size();
    let train_block = inject(&dataset.train_config, &cfg.data_dir, TRAIN_MANIFEST, batch_size);
    let test_block = inject(&dataset.test_config, &cfg.data_dir, TEST_MANIFEST, batch_size);

    let train = ManifestLoader::new(ManifestConfig::from_mapping(&train_block)?, true, cfg.rng_seed)?;
    let test = ManifestLoader::new(ManifestConfig::from_mapping(&test_block)?, false, cfg.rng_seed)?;

    let wrap = |raw: ManifestLoader| -> Result<Box<dyn DataIterator<B>>> {
        let chain = raw
            .wrap(OneHot { nclasses: MANIFEST_CLASSES })
            .wrap(TypeCast::new(cfg.datatype)?)
            .wrap(MeanSubtract::new(&BGR_MEANS));
        Ok(Box::new(DeviceIterator::<B, _>::new(chain, backend.device.clone())))
    };

    Ok(DataIterators {
        train: wrap(train)?,
        test:  wrap(test)?,
    })
}

/// Copy of a loader config block with the batch-size and manifest
/// location keys filled in. `minibatch_size` always follows the run;
/// `macrobatch_size` only when the block leaves it out.
fn inject(block: &Mapping, data_dir: &Path, manifest: &str, batch_size: usize) -> Mapping {
    let mut block = block.clone();
    block.insert("minibatch_size".into(), Value::from(batch_size));
    if !block.contains_key("macrobatch_size") {
        block.insert("macrobatch_size".into(), Value::from(batch_size));
    }
    block.insert(
        "manifest_filename".into(),
        Value::from(data_dir.join(manifest).to_string_lossy().into_owned()),
    );
    block.insert(
        "manifest_root".into(),
        Value::from(data_dir.to_string_lossy().into_owned()),
    );
    block
}
