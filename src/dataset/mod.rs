//! Dataset module for image-folder data handling
//!
//! This module provides functionality for:
//! - Scanning a directory of class subfolders
//! - Splitting each class into training and validation files
//! - On-the-fly augmentation of training images
//! - Batching decoded images into Burn tensors
//!
//! ## Split Strategy
//!
//! The split is per class over the sorted file list: the first
//! `floor(n * 0.2)` files of each class are validation, the rest training.
//! Validation data is never shuffled or augmented.

pub mod augmentation;
pub mod burn_dataset;
pub mod feeder;
pub mod loader;

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{ImageBatch, ImageBatcher, ImageFolderDataset, ImageItem};
pub use feeder::{DataFeeder, FeederConfig};
pub use loader::{ImageFolder, ImageSample, Subset};
