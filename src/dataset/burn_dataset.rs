//! Burn Dataset Integration
//!
//! Implements Burn's Dataset trait over an image-folder split and a Batcher
//! that turns decoded images into rescaled `[N, 3, H, W]` tensors.
//!
//! Augmentation happens inside the batcher, after resizing and before
//! rescaling, so the same dataset can feed both training and validation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::config::RESCALE;
use crate::dataset::augmentation::Augmenter;
use crate::dataset::loader::ImageSample;
use crate::utils::error::{ClassifierError, Result};

/// A decoded image resized to the model input size
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub image: RgbImage,
    pub label: usize,
    pub path: PathBuf,
}

impl ImageItem {
    /// Decode `path` and resize it to `width` x `height`
    pub fn from_path(path: &PathBuf, label: usize, height: usize, width: usize) -> Result<Self> {
        let decode_err = |e: image::ImageError| {
            ClassifierError::Dataset(format!("Failed to decode {}: {}", path.display(), e))
        };
        let image = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(decode_err)?
            .resize_exact(width as u32, height as u32, FilterType::Triangle)
            .to_rgb8();

        Ok(Self {
            image,
            label,
            path: path.clone(),
        })
    }
}

/// Lazily decoded dataset over a list of samples
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples: Vec<ImageSample>,
    height: usize,
    width: usize,
}

impl ImageFolderDataset {
    pub fn new(samples: Vec<ImageSample>, height: usize, width: usize) -> Self {
        Self {
            samples,
            height,
            width,
        }
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    /// Unreadable images are logged and yield `None`
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        match ImageItem::from_path(&sample.path, sample.label, self.height, self.width) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping {}: {}", sample.path.display(), e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images with their integer class labels
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher that optionally augments, then rescales to `[0, 1]`
pub struct ImageBatcher {
    height: usize,
    width: usize,
    augmenter: Option<Augmenter>,
    /// Base seed; each batch derives its own RNG from it
    seed: u64,
    counter: AtomicU64,
}

impl Clone for ImageBatcher {
    fn clone(&self) -> Self {
        Self {
            height: self.height,
            width: self.width,
            augmenter: self.augmenter.clone(),
            seed: self.seed,
            counter: AtomicU64::new(self.counter.load(Ordering::Relaxed)),
        }
    }
}

impl std::fmt::Debug for ImageBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBatcher")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("augmenting", &self.augmenter.is_some())
            .finish()
    }
}

impl ImageBatcher {
    /// Batcher without augmentation
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            augmenter: None,
            seed: 0,
            counter: AtomicU64::new(0),
        }
    }

    /// Batcher that applies `augmenter` to every image
    pub fn augmenting(height: usize, width: usize, augmenter: Augmenter, seed: u64) -> Self {
        Self {
            height,
            width,
            augmenter: Some(augmenter),
            seed,
            counter: AtomicU64::new(0),
        }
    }

    pub fn is_augmenting(&self) -> bool {
        self.augmenter.is_some()
    }

    /// Flattened CHW pixels of `item`, scaled by [`RESCALE`]
    fn pixels(&self, item: &ImageItem, rng: &mut ChaCha8Rng) -> Vec<f32> {
        let augmented;
        let img = match &self.augmenter {
            Some(augmenter) => {
                augmented = augmenter.augment(&item.image, rng);
                &augmented
            }
            None => &item.image,
        };

        let (height, width) = (self.height, self.width);
        let mut data = vec![0.0f32; 3 * height * width];
        for (x, y, pixel) in img.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            if x >= width || y >= height {
                continue;
            }
            for c in 0..3 {
                data[c * height * width + y * width + x] = pixel[c] as f32 * RESCALE;
            }
        }
        data
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let batch_index = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_index));

        let mut images_data = Vec::with_capacity(batch_size * 3 * self.height * self.width);
        let mut targets_data = Vec::with_capacity(batch_size);
        for item in &items {
            images_data.extend(self.pixels(item, &mut rng));
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, self.height, self.width]),
            device,
        );
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}
