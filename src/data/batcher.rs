// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<ImageItem>
// into one `Batch`:
//
//   pixels  N × [c·h·w] u8  → inputs  [N, c·h·w] floats in [0, 1]
//   labels  N               → targets [N, nclasses] one-hot
//
// `LoaderIterator` puts a Burn DataLoader built on this batcher
// behind the `DataIterator` contract.

use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::batch::{Batch, DataIterator};
use crate::data::dataset::{ImageDataset, ImageItem};
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device:   B::Device,
    features: usize,
    nclasses: usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, features: usize, nclasses: usize) -> Self {
        Self { device, features, nclasses }
    }
}

impl<B: Backend> Batcher<ImageItem, Batch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>) -> Batch<B> {
        let n = items.len();

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().map(|&p| p as f32 / 255.0))
            .collect();

        let mut one_hot = vec![0.0f32; n * self.nclasses];
        for (row, item) in items.iter().enumerate() {
            // readers reject labels >= nclasses, so this never clips
            if item.label < self.nclasses {
                one_hot[row * self.nclasses + item.label] = 1.0;
            }
        }

        Batch {
            inputs:  Tensor::from_data(TensorData::new(pixels, [n, self.features]), &self.device),
            targets: Tensor::from_data(TensorData::new(one_hot, [n, self.nclasses]), &self.device),
        }
    }
}

/// A registered dataset split served through Burn's DataLoader.
pub struct LoaderIterator<B: Backend> {
    loader:     Arc<dyn DataLoader<Batch<B>>>,
    batch_size: usize,
    shape:      [usize; 3],
    nclasses:   usize,
}

impl<B: Backend> LoaderIterator<B> {
    /// `shuffle_seed` reshuffles the split on every pass.
    pub fn new(
        dataset:      ImageDataset,
        batch_size:   usize,
        shuffle_seed: Option<u64>,
        device:       &B::Device,
    ) -> Self {
        let shape = dataset.shape();
        let nclasses = dataset.nclasses();
        let batcher = ImageBatcher::<B>::new(device.clone(), shape.iter().product(), nclasses);

        let mut builder = DataLoaderBuilder::new(batcher).batch_size(batch_size).num_workers(1);
        if let Some(seed) = shuffle_seed {
            builder = builder.shuffle(seed);
        }

        Self {
            loader: builder.build(dataset),
            batch_size,
            shape,
            nclasses,
        }
    }
}

impl<B: Backend> DataIterator<B> for LoaderIterator<B> {
    fn ndata(&self) -> usize {
        self.loader.num_items()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn input_shape(&self) -> [usize; 3] {
        self.shape
    }

    fn nclasses(&self) -> usize {
        self.nclasses
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Result<Batch<B>>> + '_> {
        Box::new(self.loader.iter().map(Ok))
    }
}
