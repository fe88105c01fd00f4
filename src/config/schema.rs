//! Raw document schemas for `config.yaml` and `params.yaml`.
//!
//! Sections and leaf keys are optional here; [`super::ConfigurationManager`]
//! decides which absences are errors and which fall back to defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::backbone::Architecture;
use crate::utils::error::{ClassifierError, Result};

/// Run configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub artifacts_root: Option<PathBuf>,
    pub data_ingestion: Option<DataIngestionSection>,
    pub prepare_base_model: Option<PrepareBaseModelSection>,
    pub training: Option<TrainingSection>,
    pub evaluation: Option<EvaluationSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataIngestionSection {
    pub root_dir: Option<PathBuf>,
    pub source_url: Option<String>,
    pub local_data_file: Option<PathBuf>,
    pub unzip_dir: Option<PathBuf>,
    /// Entry name suffixes to keep when extracting, e.g. `.jpg`
    pub image_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepareBaseModelSection {
    pub root_dir: Option<PathBuf>,
    pub base_model_path: Option<PathBuf>,
    pub updated_base_model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingSection {
    pub root_dir: Option<PathBuf>,
    pub trained_model_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSection {
    pub score_path: Option<PathBuf>,
}

/// Hyperparameter document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// `[height, width, channels]`
    #[serde(rename = "IMAGE_SIZE")]
    pub image_size: Vec<usize>,

    #[serde(rename = "LEARNING_RATE")]
    pub learning_rate: f64,

    #[serde(rename = "INCLUDE_TOP")]
    pub include_top: bool,

    /// `none`, a local record path, or an http(s) URL. `null` means random init.
    #[serde(rename = "WEIGHTS", default)]
    pub weights: Option<String>,

    #[serde(rename = "CLASSES")]
    pub classes: usize,

    #[serde(rename = "EPOCHS")]
    pub epochs: usize,

    #[serde(rename = "BATCH_SIZE")]
    pub batch_size: usize,

    #[serde(rename = "AUGMENTATION")]
    pub augmentation: bool,

    #[serde(rename = "ARCHITECTURE", default)]
    pub architecture: Architecture,

    #[serde(rename = "SEED", default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

impl Params {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let [height, width, channels] = self.image_shape()?;
        if height == 0 || width == 0 {
            return Err(ClassifierError::Config(format!(
                "IMAGE_SIZE must be positive, got {:?}",
                self.image_size
            )));
        }
        if channels != 3 {
            return Err(ClassifierError::Config(format!(
                "IMAGE_SIZE must have 3 (RGB) channels, got {}",
                channels
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ClassifierError::Config(format!(
                "LEARNING_RATE must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.classes == 0 {
            return Err(ClassifierError::Config("CLASSES must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ClassifierError::Config("BATCH_SIZE must be at least 1".into()));
        }
        Ok(())
    }

    /// `IMAGE_SIZE` as a fixed `[height, width, channels]` triple
    pub fn image_shape(&self) -> Result<[usize; 3]> {
        match self.image_size.as_slice() {
            [h, w, c] => Ok([*h, *w, *c]),
            other => Err(ClassifierError::Config(format!(
                "IMAGE_SIZE must be [height, width, channels], got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = r#"
AUGMENTATION: true
IMAGE_SIZE: [224, 224, 3]
BATCH_SIZE: 16
INCLUDE_TOP: false
EPOCHS: 1
CLASSES: 2
WEIGHTS: none
LEARNING_RATE: 0.01
"#;

    #[test]
    fn test_params_parse_with_defaults() {
        let params: Params = serde_yaml::from_str(PARAMS).unwrap();
        params.validate().unwrap();
        assert_eq!(params.image_shape().unwrap(), [224, 224, 3]);
        assert_eq!(params.architecture, Architecture::Vgg16);
        assert_eq!(params.seed, 42);
        assert!(params.augmentation);
    }

    #[test]
    fn test_params_validation() {
        let mut params: Params = serde_yaml::from_str(PARAMS).unwrap();
        params.image_size = vec![224, 224];
        assert!(matches!(params.validate(), Err(ClassifierError::Config(_))));

        params.image_size = vec![224, 224, 1];
        assert!(params.validate().is_err());

        params.image_size = vec![224, 224, 3];
        params.batch_size = 0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_run_config_sections_are_optional() {
        let config: RunConfig = serde_yaml::from_str("artifacts_root: out\n").unwrap();
        assert_eq!(config.artifacts_root, Some(PathBuf::from("out")));
        assert!(config.prepare_base_model.is_none());
        assert!(config.training.is_none());
    }
}
