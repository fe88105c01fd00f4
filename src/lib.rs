//! # CNN Classifier
//!
//! A transfer-learning image classification pipeline built on the Burn framework.
//!
//! ## Features
//!
//! - **Four-stage pipeline**: data ingestion, base model preparation, training and evaluation
//! - **YAML configuration** split into a run configuration and hyperparameters
//! - **VGG-style backbones** with positional layer freezing and a dense softmax head
//! - **Burn framework** with NdArray, WGPU or CUDA backends selected at build time
//!
//! ## Modules
//!
//! - `config`: configuration documents and the per-stage records derived from them
//! - `dataset`: image-folder loading, validation split, augmentation and batching
//! - `model`: backbone, classifier head and on-disk artifacts
//! - `stages`: the four pipeline stages and their drivers
//! - `utils`: logging, errors, HTTP downloads, metrics and file helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cnn_classifier::config::ConfigurationManager;
//! use cnn_classifier::stages::run_pipeline;
//!
//! let manager = ConfigurationManager::from_default_paths()?;
//! let score = run_pipeline(&manager)?;
//! println!("loss {:.4}, accuracy {:.4}", score.loss, score.accuracy);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod stages;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ConfigurationManager, Params, RunConfig};
pub use dataset::{DataFeeder, FeederConfig, ImageFolder};
pub use model::{Architecture, CompiledModel, ImageClassifier, WeightSource};
pub use stages::{
    DataIngestion, Evaluation, ExtractionSummary, PrepareBaseModel, Score, Training,
    TrainingHistory,
};
pub use utils::error::{ClassifierError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
