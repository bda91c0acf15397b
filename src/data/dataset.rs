// ============================================================
// Layer 4 — In-memory Datasets
// ============================================================
// Decoded splits of the registered datasets, exposed through
// Burn's `Dataset` trait so the batcher can index them.

use burn::data::dataset::Dataset;

/// One labelled image as stored on disk: raw `u8` pixels laid out
/// channel-major ([channels, height, width]) and a class index.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub pixels: Vec<u8>,
    pub label:  usize,
}

/// An in-memory split of a registered dataset.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    items:    Vec<ImageItem>,
    shape:    [usize; 3],
    nclasses: usize,
}

impl ImageDataset {
    pub fn new(items: Vec<ImageItem>, shape: [usize; 3], nclasses: usize) -> Self {
        Self { items, shape, nclasses }
    }

    /// [channels, height, width]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn nclasses(&self) -> usize {
        self.nclasses
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Train and test splits returned by a registry constructor.
#[derive(Debug, Clone)]
pub struct DatasetSplits {
    pub train: ImageDataset,
    pub test:  ImageDataset,
}
