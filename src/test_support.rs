//! Shared helpers for the in-module tests.

use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use serde_yaml::Value;

pub type TestBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;

static NEXT: AtomicUsize = AtomicUsize::new(0);

/// A fresh, empty directory under the system temp dir.
pub fn scratch_dir(label: &str) -> PathBuf {
    let n = NEXT.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("modelrun-{label}-{}-{n}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn yaml(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap()
}

/// Write MNIST-style IDX files (`rows`x`cols` images) for one split.
pub fn write_idx_split(dir: &std::path::Path, prefix: &str, images: &[Vec<u8>], labels: &[u8], rows: u32, cols: u32) {
    let mut img = Vec::new();
    img.extend_from_slice(&0x0803u32.to_be_bytes());
    img.extend_from_slice(&(images.len() as u32).to_be_bytes());
    img.extend_from_slice(&rows.to_be_bytes());
    img.extend_from_slice(&cols.to_be_bytes());
    for image in images {
        img.extend_from_slice(image);
    }
    fs::write(dir.join(format!("{prefix}-images-idx3-ubyte")), img).unwrap();

    let mut lbl = Vec::new();
    lbl.extend_from_slice(&0x0801u32.to_be_bytes());
    lbl.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    lbl.extend_from_slice(labels);
    fs::write(dir.join(format!("{prefix}-labels-idx1-ubyte")), lbl).unwrap();
}

/// A tiny MNIST data dir: 28x28 images, `train` and `test` samples.
pub fn tiny_mnist(label: &str, train: usize, test: usize) -> PathBuf {
    let dir = scratch_dir(label);
    let make = |n: usize| -> (Vec<Vec<u8>>, Vec<u8>) {
        let labels: Vec<u8> = (0..n).map(|i| (i % 10) as u8).collect();
        let images = labels.iter().map(|&l| vec![l.wrapping_mul(25); 28 * 28]).collect();
        (images, labels)
    };
    let (images, labels) = make(train);
    write_idx_split(&dir, "train", &images, &labels, 28, 28);
    let (images, labels) = make(test);
    write_idx_split(&dir, "t10k", &images, &labels, 28, 28);
    dir
}
