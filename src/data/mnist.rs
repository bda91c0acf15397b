// ============================================================
// Layer 4 — MNIST Loader
// ============================================================
// Reads the four IDX files from the data directory:
//
//   train-images-idx3-ubyte   train-labels-idx1-ubyte
//   t10k-images-idx3-ubyte    t10k-labels-idx1-ubyte
//
// The `mnist` crate does the decoding. It panics on anything it
// does not expect, so each file's header (magic, count, 28x28
// geometry, payload size) is checked here first and a
// malformed file comes back as `Error::Io` with InvalidData.

use std::{
    fs::File,
    io::{ErrorKind, Read},
    panic::{self, AssertUnwindSafe},
    path::Path,
};

use mnist::{Mnist, MnistBuilder};

use crate::data::dataset::{DatasetSplits, ImageDataset, ImageItem};
use crate::error::{Error, Result};

const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;
const SIDE:        usize = 28;
const PIXELS:      usize = SIDE * SIDE;
const NCLASSES:    usize = 10;

/// Load the train (`train-*`) and test (`t10k-*`) splits from `data_dir`.
pub fn load(data_dir: &Path) -> Result<DatasetSplits> {
    let ntrain = check_split(data_dir, "train")?;
    let ntest = check_split(data_dir, "t10k")?;

    let base = format!("{}/", data_dir.display());
    let Mnist { trn_img, trn_lbl, tst_img, tst_lbl, .. } = panic::catch_unwind(AssertUnwindSafe(|| {
        MnistBuilder::new()
            .label_format_digit()
            .base_path(&base)
            .training_set_length(ntrain)
            .validation_set_length(0)
            .test_set_length(ntest)
            .finalize()
    }))
    .map_err(|_| Error::invalid_file(data_dir, "MNIST files could not be decoded"))?;

    Ok(DatasetSplits {
        train: to_dataset(&data_dir.join("train-labels-idx1-ubyte"), &trn_img, &trn_lbl)?,
        test:  to_dataset(&data_dir.join("t10k-labels-idx1-ubyte"), &tst_img, &tst_lbl)?,
    })
}

/// Validate one split's headers and return its sample count.
fn check_split(dir: &Path, prefix: &str) -> Result<u32> {
    let image_path = dir.join(format!("{prefix}-images-idx3-ubyte"));
    let label_path = dir.join(format!("{prefix}-labels-idx1-ubyte"));

    let (images, [magic, count, rows, cols]) = read_header::<4>(&image_path)?;
    if magic != IMAGE_MAGIC {
        return Err(Error::invalid_file(&image_path, "not an IDX image file"));
    }
    if (rows as usize, cols as usize) != (SIDE, SIDE) {
        return Err(Error::invalid_file(
            &image_path,
            format!("expected {SIDE}x{SIDE} images, header says {rows}x{cols}"),
        ));
    }
    let needed = u64::from(count)
        .checked_mul(PIXELS as u64)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| Error::invalid_file(&image_path, "image count overflows"))?;
    if images < needed {
        return Err(Error::invalid_file(&image_path, "image data shorter than its header claims"));
    }

    let (labels, [magic, nlabels]) = read_header::<2>(&label_path)?;
    if magic != LABEL_MAGIC {
        return Err(Error::invalid_file(&label_path, "not an IDX label file"));
    }
    if nlabels != count {
        return Err(Error::invalid_file(&label_path, format!("{nlabels} labels for {count} images")));
    }
    if labels < u64::from(count) + 8 {
        return Err(Error::invalid_file(&label_path, "label data shorter than its header claims"));
    }
    if count == 0 {
        return Err(Error::invalid_file(&image_path, "split has no images"));
    }
    Ok(count)
}

/// File length and the first `N` big-endian header words.
fn read_header<const N: usize>(path: &Path) -> Result<(u64, [u32; N])> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let len = file.metadata().map_err(|e| Error::io(path, e))?.len();

    let mut words = [0u32; N];
    for word in &mut words {
        let mut buf = [0u8; 4];
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::invalid_file(path, "truncated IDX header"),
            _ => Error::io(path, e),
        })?;
        *word = u32::from_be_bytes(buf);
    }
    Ok((len, words))
}

fn to_dataset(label_path: &Path, images: &[u8], labels: &[u8]) -> Result<ImageDataset> {
    if let Some(bad) = labels.iter().find(|&&l| usize::from(l) >= NCLASSES) {
        return Err(Error::invalid_file(label_path, format!("label {bad} out of range")));
    }
    let items: Vec<ImageItem> = images
        .chunks_exact(PIXELS)
        .zip(labels)
        .map(|(pixels, &label)| ImageItem { pixels: pixels.to_vec(), label: usize::from(label) })
        .collect();
    tracing::debug!("MNIST '{}': {} images", label_path.display(), items.len());
    Ok(ImageDataset::new(items, [1, SIDE, SIDE], NCLASSES))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use burn::data::dataset::Dataset;

    use super::*;
    use crate::test_support::{scratch_dir, tiny_mnist, write_idx_split};

    fn invalid_data(result: Result<impl std::fmt::Debug>) {
        match result {
            Err(Error::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::InvalidData),
            other => panic!("expected invalid data, got {other:?}"),
        }
    }

    fn write_words(path: &Path, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn reads_both_splits() {
        let dir = tiny_mnist("mnist-read", 12, 5);
        let splits = load(&dir).unwrap();
        assert_eq!(splits.train.len(), 12);
        assert_eq!(splits.test.len(), 5);
        assert_eq!(splits.train.shape(), [1, 28, 28]);
        let third = splits.train.get(3).unwrap();
        assert_eq!(third.label, 3);
        assert_eq!(third.pixels, vec![75; PIXELS]);
    }

    #[test]
    fn missing_files_are_not_found() {
        let dir = scratch_dir("mnist-missing");
        match load(&dir) {
            Err(Error::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::NotFound),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let dir = scratch_dir("mnist-mismatch");
        write_idx_split(&dir, "train", &[vec![0; PIXELS], vec![1; PIXELS]], &[0], 28, 28);
        write_idx_split(&dir, "t10k", &[vec![0; PIXELS]], &[0], 28, 28);
        invalid_data(load(&dir));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let dir = scratch_dir("mnist-magic");
        fs::write(dir.join("train-images-idx3-ubyte"), [0u8; 16]).unwrap();
        invalid_data(check_split(&dir, "train"));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let dir = scratch_dir("mnist-truncated");
        fs::write(dir.join("train-images-idx3-ubyte"), [0u8, 0, 8, 3, 0, 0]).unwrap();
        invalid_data(check_split(&dir, "train"));
    }

    #[test]
    fn other_geometry_is_rejected() {
        let dir = scratch_dir("mnist-geometry");
        write_idx_split(&dir, "train", &[vec![0; 16]], &[0], 4, 4);
        invalid_data(check_split(&dir, "train"));
    }

    #[test]
    fn huge_header_values_are_rejected_without_panicking() {
        let dir = scratch_dir("mnist-huge");
        let images = dir.join("train-images-idx3-ubyte");
        write_words(&dir.join("train-labels-idx1-ubyte"), &[LABEL_MAGIC, u32::MAX]);

        write_words(&images, &[IMAGE_MAGIC, 2, u32::MAX, u32::MAX]);
        invalid_data(check_split(&dir, "train"));

        write_words(&images, &[IMAGE_MAGIC, u32::MAX, 28, 28]);
        invalid_data(check_split(&dir, "train"));
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let dir = scratch_dir("mnist-label");
        write_idx_split(&dir, "train", &[vec![0; PIXELS]], &[10], 28, 28);
        write_idx_split(&dir, "t10k", &[vec![0; PIXELS]], &[0], 28, 28);
        invalid_data(load(&dir));
    }
}
