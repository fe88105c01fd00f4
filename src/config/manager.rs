//! Configuration manager: loads both documents once and hands out stage records.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::entity::{
    DataIngestionConfig, EvaluationConfig, PrepareBaseModelConfig, TrainingConfig,
};
use super::schema::{DataIngestionSection, Params, RunConfig};
use super::{
    CONFIG_FILE_PATH, DATASET_SUBDIR, DEFAULT_ARTIFACTS_ROOT, DEFAULT_IMAGE_EXTENSIONS,
    PARAMS_FILE_PATH, SCORES_FILE_PATH,
};
use crate::model::backbone::WeightSource;
use crate::utils::common::{create_directories, read_yaml};
use crate::utils::error::{Result, ResultExt};

/// Resolves stage configuration records from the run configuration and hyperparameters
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    config: RunConfig,
    params: Params,
    artifacts_root: PathBuf,
}

impl ConfigurationManager {
    /// Load `config_path` and `params_path` and create the artifacts root
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(config_path: P, params_path: Q) -> Result<Self> {
        let config: RunConfig = read_yaml(config_path.as_ref())?;
        let params: Params = read_yaml(params_path.as_ref())?;
        Self::from_documents(config, params)
    }

    /// Load `config/config.yaml` and `params.yaml` from the working directory
    pub fn from_default_paths() -> Result<Self> {
        Self::new(CONFIG_FILE_PATH, PARAMS_FILE_PATH)
    }

    /// Build from already-parsed documents
    pub fn from_documents(config: RunConfig, params: Params) -> Result<Self> {
        params.validate()?;

        let artifacts_root = config
            .artifacts_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_ROOT));
        create_directories(&[&artifacts_root])?;

        Ok(Self {
            config,
            params,
            artifacts_root,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    pub fn get_data_ingestion_config(&self) -> Result<DataIngestionConfig> {
        let section = self.config.data_ingestion.clone().unwrap_or_default();
        let config = self.resolve_data_ingestion(section);

        create_directories(&[&config.root_dir])?;
        debug!("data ingestion config: {:?}", config);
        Ok(config)
    }

    pub fn get_prepare_base_model_config(&self) -> Result<PrepareBaseModelConfig> {
        let section = self
            .config
            .prepare_base_model
            .clone()
            .config_context("'prepare_base_model' section is missing from the run configuration")?;

        let root_dir = section
            .root_dir
            .unwrap_or_else(|| self.artifacts_root.join("prepare_base_model"));
        let base_model_path = section
            .base_model_path
            .unwrap_or_else(|| root_dir.join("base_model"));
        let updated_base_model_path = section
            .updated_base_model_path
            .unwrap_or_else(|| root_dir.join("base_model_updated"));

        let params_weights = WeightSource::parse(self.params.weights.as_deref())?;

        create_directories(&[&root_dir])?;

        Ok(PrepareBaseModelConfig {
            root_dir,
            base_model_path,
            updated_base_model_path,
            params_image_size: self.params.image_shape()?,
            params_learning_rate: self.params.learning_rate,
            params_include_top: self.params.include_top,
            params_weights,
            params_classes: self.params.classes,
            params_architecture: self.params.architecture,
        })
    }

    pub fn get_training_config(&self) -> Result<TrainingConfig> {
        let section = self.config.training.clone().unwrap_or_default();
        let root_dir = section
            .root_dir
            .unwrap_or_else(|| self.artifacts_root.join("training"));
        let trained_model_path = section
            .trained_model_path
            .unwrap_or_else(|| root_dir.join("model"));

        create_directories(&[&root_dir])?;

        Ok(TrainingConfig {
            root_dir,
            trained_model_path,
            updated_base_model_path: self.updated_base_model_path(),
            training_data: self.training_data_dir(),
            params_epochs: self.params.epochs,
            params_batch_size: self.params.batch_size,
            params_is_augmentation: self.params.augmentation,
            params_image_size: self.params.image_shape()?,
            params_seed: self.params.seed,
        })
    }

    pub fn get_validation_config(&self) -> Result<EvaluationConfig> {
        let training = self.config.training.clone().unwrap_or_default();
        let path_of_model = training.trained_model_path.unwrap_or_else(|| {
            training
                .root_dir
                .unwrap_or_else(|| self.artifacts_root.join("training"))
                .join("model")
        });
        let score_path = self
            .config
            .evaluation
            .as_ref()
            .and_then(|e| e.score_path.clone())
            .unwrap_or_else(|| PathBuf::from(SCORES_FILE_PATH));

        Ok(EvaluationConfig {
            path_of_model,
            training_data: self.training_data_dir(),
            score_path,
            params_image_size: self.params.image_shape()?,
            params_batch_size: self.params.batch_size,
            params_seed: self.params.seed,
        })
    }

    fn resolve_data_ingestion(&self, section: DataIngestionSection) -> DataIngestionConfig {
        DataIngestionConfig {
            root_dir: section
                .root_dir
                .unwrap_or_else(|| self.artifacts_root.join("data_ingestion")),
            source_url: section.source_url.unwrap_or_default(),
            local_data_file: section.local_data_file.unwrap_or_default(),
            unzip_dir: section.unzip_dir.unwrap_or_default(),
            image_extensions: section.image_extensions.unwrap_or_else(|| {
                DEFAULT_IMAGE_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
        }
    }

    fn updated_base_model_path(&self) -> PathBuf {
        let section = self.config.prepare_base_model.clone().unwrap_or_default();
        section.updated_base_model_path.unwrap_or_else(|| {
            section
                .root_dir
                .unwrap_or_else(|| self.artifacts_root.join("prepare_base_model"))
                .join("base_model_updated")
        })
    }

    fn training_data_dir(&self) -> PathBuf {
        let section = self.config.data_ingestion.clone().unwrap_or_default();
        self.resolve_data_ingestion(section)
            .unzip_dir
            .join(DATASET_SUBDIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use crate::utils::error::ClassifierError;

    const PARAMS: &str = "\
AUGMENTATION: true
IMAGE_SIZE: [64, 64, 3]
BATCH_SIZE: 4
INCLUDE_TOP: false
EPOCHS: 2
CLASSES: 2
WEIGHTS: none
LEARNING_RATE: 0.01
";

    fn write_docs(config: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let params_path = dir.path().join("params.yaml");
        let root = dir.path().display().to_string();
        fs::write(&config_path, config.replace("{root}", &root)).unwrap();
        fs::write(&params_path, PARAMS).unwrap();
        (dir, config_path, params_path)
    }

    const FULL: &str = "\
artifacts_root: {root}/artifacts
data_ingestion:
  root_dir: {root}/artifacts/data_ingestion
  source_url: https://example.com/data.zip
  local_data_file: {root}/artifacts/data_ingestion/data.zip
  unzip_dir: {root}/artifacts/data_ingestion
prepare_base_model:
  root_dir: {root}/artifacts/prepare_base_model
  base_model_path: {root}/artifacts/prepare_base_model/base_model
  updated_base_model_path: {root}/artifacts/prepare_base_model/base_model_updated
training:
  root_dir: {root}/artifacts/training
  trained_model_path: {root}/artifacts/training/model
";

    #[test]
    fn test_new_creates_artifacts_root() {
        let (dir, config, params) = write_docs(FULL);
        let manager = ConfigurationManager::new(&config, &params).unwrap();
        assert!(dir.path().join("artifacts").is_dir());
        assert_eq!(manager.params().classes, 2);
    }

    #[test]
    fn test_unparseable_documents_are_config_errors() {
        let (dir, config, _) = write_docs(FULL);
        let bad_params = dir.path().join("bad.yaml");
        fs::write(&bad_params, "IMAGE_SIZE: [64, 64\n").unwrap();
        let err = ConfigurationManager::new(&config, &bad_params).unwrap_err();
        assert!(matches!(err, ClassifierError::Config(_)));
    }

    #[test]
    fn test_stage_configs_resolve_paths() {
        let (dir, config, params) = write_docs(FULL);
        let manager = ConfigurationManager::new(&config, &params).unwrap();
        let artifacts = dir.path().join("artifacts");

        let ingestion = manager.get_data_ingestion_config().unwrap();
        assert_eq!(ingestion.source_url, "https://example.com/data.zip");
        assert_eq!(ingestion.image_extensions, vec![".jpg".to_string()]);

        let prepare = manager.get_prepare_base_model_config().unwrap();
        assert_eq!(prepare.params_image_size, [64, 64, 3]);
        assert_eq!(prepare.params_weights, WeightSource::Random);
        assert!(prepare.root_dir.is_dir());

        let training = manager.get_training_config().unwrap();
        assert_eq!(
            training.updated_base_model_path,
            artifacts.join("prepare_base_model/base_model_updated")
        );
        assert_eq!(training.training_data, artifacts.join("data_ingestion/PetImages"));
        assert_eq!(training.params_epochs, 2);
        assert!(training.root_dir.is_dir());

        let validation = manager.get_validation_config().unwrap();
        assert_eq!(validation.path_of_model, training.trained_model_path);
        assert_eq!(validation.training_data, training.training_data);
        assert_eq!(validation.score_path, PathBuf::from("scores.json"));
    }

    #[test]
    fn test_missing_prepare_base_model_section_is_an_error() {
        let (_dir, config, params) = write_docs("artifacts_root: {root}/artifacts\n");
        let manager = ConfigurationManager::new(&config, &params).unwrap();
        let err = manager.get_prepare_base_model_config().unwrap_err();
        assert!(matches!(err, ClassifierError::Config(_)));
    }

    #[test]
    fn test_missing_optional_sections_use_defaults() {
        let (dir, config, params) = write_docs("artifacts_root: {root}/artifacts\n");
        let manager = ConfigurationManager::new(&config, &params).unwrap();
        let artifacts = dir.path().join("artifacts");

        let ingestion = manager.get_data_ingestion_config().unwrap();
        assert_eq!(ingestion.root_dir, artifacts.join("data_ingestion"));
        assert!(ingestion.source_url.is_empty());
        assert_eq!(ingestion.local_data_file, PathBuf::new());

        let training = manager.get_training_config().unwrap();
        assert_eq!(training.root_dir, artifacts.join("training"));
        assert_eq!(training.trained_model_path, artifacts.join("training/model"));
        assert_eq!(
            training.updated_base_model_path,
            artifacts.join("prepare_base_model/base_model_updated")
        );
        assert_eq!(training.training_data, PathBuf::from("PetImages"));
    }

    #[test]
    fn test_imagenet_weights_resolve_to_pretrained_source() {
        let (dir, config, _) = write_docs(FULL);
        let params_path = dir.path().join("imagenet.yaml");
        fs::write(&params_path, PARAMS.replace("WEIGHTS: none", "WEIGHTS: imagenet")).unwrap();
        let manager = ConfigurationManager::new(&config, &params_path).unwrap();
        let prepare = manager.get_prepare_base_model_config().unwrap();
        assert_eq!(prepare.params_weights, WeightSource::ImageNet);
    }

    #[test]
    fn test_unsupported_weights_scheme_is_config_error() {
        let (dir, config, _) = write_docs(FULL);
        let params_path = dir.path().join("s3.yaml");
        fs::write(&params_path, PARAMS.replace("WEIGHTS: none", "WEIGHTS: s3://bucket/vgg16.pth")).unwrap();
        let manager = ConfigurationManager::new(&config, &params_path).unwrap();
        assert!(matches!(
            manager.get_prepare_base_model_config(),
            Err(ClassifierError::Config(_))
        ));
    }
}
