//! Pipeline configuration
//!
//! - `schema`: raw `config.yaml` / `params.yaml` documents
//! - `entity`: resolved per-stage records
//! - `manager`: [`ConfigurationManager`], the only reader of the raw documents

pub mod entity;
pub mod manager;
pub mod schema;

pub use entity::{DataIngestionConfig, EvaluationConfig, PrepareBaseModelConfig, TrainingConfig};
pub use manager::ConfigurationManager;
pub use schema::{Params, RunConfig};

/// Run configuration location, relative to the working directory
pub const CONFIG_FILE_PATH: &str = "config/config.yaml";

/// Hyperparameter document location, relative to the working directory
pub const PARAMS_FILE_PATH: &str = "params.yaml";

pub const DEFAULT_ARTIFACTS_ROOT: &str = "artifacts";

/// Subdirectory of the extraction target that holds the class folders
pub const DATASET_SUBDIR: &str = "PetImages";

pub const SCORES_FILE_PATH: &str = "scores.json";

pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[".jpg"];

/// Fraction of each class held out for validation
pub const VALIDATION_SPLIT: f64 = 0.2;

/// Pixel rescaling applied by every data feeder
pub const RESCALE: f32 = 1.0 / 255.0;
