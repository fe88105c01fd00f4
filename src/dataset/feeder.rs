//! Directory data feeders
//!
//! A [`DataFeeder`] reads one side of the per-class validation split of an
//! image folder and hands out batches on demand. Batches are built lazily so
//! only one batch of decoded images is held at a time.

use std::path::Path;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use super::augmentation::{AugmentationConfig, Augmenter};
use super::burn_dataset::{ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
use super::loader::{ImageFolder, Subset};
use crate::config::VALIDATION_SPLIT;
use crate::utils::error::{ClassifierError, Result};

/// How a feeder reads and batches its subset
#[derive(Debug, Clone)]
pub struct FeederConfig {
    pub subset: Subset,
    pub validation_split: f64,
    pub height: usize,
    pub width: usize,
    pub batch_size: usize,
    /// Reshuffle the sample order every epoch
    pub shuffle: bool,
    pub augmentation: Option<AugmentationConfig>,
    pub seed: u64,
}

impl FeederConfig {
    /// Shuffled training side of the split, augmented when `augmentation` is set
    pub fn training(
        height: usize,
        width: usize,
        batch_size: usize,
        augmentation: Option<AugmentationConfig>,
        seed: u64,
    ) -> Self {
        Self {
            subset: Subset::Training,
            validation_split: VALIDATION_SPLIT,
            height,
            width,
            batch_size,
            shuffle: true,
            augmentation,
            seed,
        }
    }

    /// Validation side of the split, in directory order and never augmented
    pub fn validation(height: usize, width: usize, batch_size: usize, seed: u64) -> Self {
        Self {
            subset: Subset::Validation,
            validation_split: VALIDATION_SPLIT,
            height,
            width,
            batch_size,
            shuffle: false,
            augmentation: None,
            seed,
        }
    }
}

/// Batches of one split of an image folder
#[derive(Debug, Clone)]
pub struct DataFeeder {
    config: FeederConfig,
    class_names: Vec<String>,
    dataset: ImageFolderDataset,
    batcher: ImageBatcher,
}

impl DataFeeder {
    /// Scan `dir` and select the configured subset
    pub fn from_directory(dir: &Path, config: FeederConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(ClassifierError::Dataset(
                "Batch size must be at least 1".to_string(),
            ));
        }

        let folder = ImageFolder::scan(dir)?;
        let samples = folder.subset(config.subset, config.validation_split);
        let dataset = ImageFolderDataset::new(samples, config.height, config.width);

        let batcher = match &config.augmentation {
            Some(augmentation) => ImageBatcher::augmenting(
                config.height,
                config.width,
                Augmenter::new(augmentation.clone()),
                config.seed,
            ),
            None => ImageBatcher::new(config.height, config.width),
        };

        info!(
            "{:?} feeder: {} images, {} classes, batch size {}{}",
            config.subset,
            dataset.len(),
            folder.num_classes(),
            config.batch_size,
            if batcher.is_augmenting() { ", augmented" } else { "" }
        );

        Ok(Self {
            class_names: folder.class_names().to_vec(),
            config,
            dataset,
            batcher,
        })
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    pub fn samples(&self) -> usize {
        self.dataset.len()
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Batches per epoch: `samples / batch_size`, floored, at least 1 when samples exist
    pub fn steps(&self) -> usize {
        match self.samples() {
            0 => 0,
            n => (n / self.config.batch_size).max(1),
        }
    }

    /// Index chunks for one epoch, `steps()` of them
    ///
    /// The order is reshuffled per epoch when shuffling is enabled and is
    /// reproducible for a given seed and epoch.
    pub fn epoch_indices(&self, epoch: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.samples()).collect();
        if self.config.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }
        indices
            .chunks(self.config.batch_size)
            .take(self.steps())
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Index chunks covering every sample once, in order
    pub fn full_pass_indices(&self) -> Vec<Vec<usize>> {
        let indices: Vec<usize> = (0..self.samples()).collect();
        indices
            .chunks(self.config.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    /// Decode `indices` in parallel and batch them; `None` if nothing could be decoded
    pub fn load_batch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Option<ImageBatch<B>> {
        let items: Vec<ImageItem> = indices
            .par_iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();

        if items.is_empty() {
            return None;
        }
        Some(self.batcher.batch(items, device))
    }
}
