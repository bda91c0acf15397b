// ============================================================
// Layer 4 — CIFAR-10 Loader
// ============================================================
// Binary batches under `cifar-10-batches-bin/`: each record is
// one label byte followed by 3072 pixel bytes (1024 red, 1024
// green, 1024 blue). `data_batch_1..5` form the train split,
// `test_batch` the test split.

use std::{fs, path::Path};

use crate::data::dataset::{DatasetSplits, ImageDataset, ImageItem};
use crate::error::{Error, Result};

const SUBDIR:      &str = "cifar-10-batches-bin";
const SIDE:        usize = 32;
const PIXELS:      usize = 3 * SIDE * SIDE;
const RECORD:      usize = 1 + PIXELS;
const NCLASSES:    usize = 10;
const TRAIN_FILES: usize = 5;

/// Load both splits from `data_dir/cifar-10-batches-bin`.
pub fn load(data_dir: &Path) -> Result<DatasetSplits> {
    let dir = data_dir.join(SUBDIR);

    let mut train = Vec::new();
    for i in 1..=TRAIN_FILES {
        train.extend(read_batch(&dir.join(format!("data_batch_{i}.bin")))?);
    }
    let test = read_batch(&dir.join("test_batch.bin"))?;
    tracing::debug!("CIFAR10: {} train / {} test images", train.len(), test.len());

    Ok(DatasetSplits {
        train: ImageDataset::new(train, [3, SIDE, SIDE], NCLASSES),
        test:  ImageDataset::new(test, [3, SIDE, SIDE], NCLASSES),
    })
}

fn read_batch(path: &Path) -> Result<Vec<ImageItem>> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    if bytes.is_empty() || bytes.len() % RECORD != 0 {
        return Err(Error::invalid_file(
            path,
            format!("size {} is not a multiple of the {RECORD}-byte record", bytes.len()),
        ));
    }

    bytes
        .chunks_exact(RECORD)
        .map(|record| {
            let label = record[0] as usize;
            if label >= NCLASSES {
                return Err(Error::invalid_file(path, format!("label {label} out of range")));
            }
            Ok(ImageItem { pixels: record[1..].to_vec(), label })
        })
        .collect()
}
