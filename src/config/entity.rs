//! Per-stage configuration records.
//!
//! Each record carries exactly what its stage needs, fully resolved.

use std::path::PathBuf;

use crate::model::backbone::{Architecture, WeightSource};

#[derive(Debug, Clone, PartialEq)]
pub struct DataIngestionConfig {
    pub root_dir: PathBuf,
    pub source_url: String,
    pub local_data_file: PathBuf,
    pub unzip_dir: PathBuf,
    /// Entry name suffixes kept during extraction
    pub image_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareBaseModelConfig {
    pub root_dir: PathBuf,
    pub base_model_path: PathBuf,
    pub updated_base_model_path: PathBuf,
    /// `[height, width, channels]`
    pub params_image_size: [usize; 3],
    pub params_learning_rate: f64,
    pub params_include_top: bool,
    pub params_weights: WeightSource,
    pub params_classes: usize,
    pub params_architecture: Architecture,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub root_dir: PathBuf,
    pub trained_model_path: PathBuf,
    pub updated_base_model_path: PathBuf,
    pub training_data: PathBuf,
    pub params_epochs: usize,
    pub params_batch_size: usize,
    pub params_is_augmentation: bool,
    pub params_image_size: [usize; 3],
    pub params_seed: u64,
}

impl TrainingConfig {
    /// Where the per-epoch metrics of a run are written
    pub fn history_path(&self) -> PathBuf {
        self.root_dir.join("history.json")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub path_of_model: PathBuf,
    pub training_data: PathBuf,
    pub score_path: PathBuf,
    pub params_image_size: [usize; 3],
    pub params_batch_size: usize,
    pub params_seed: u64,
}
