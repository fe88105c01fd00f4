//! Pipeline stages
//!
//! Each stage reads its record from the [`ConfigurationManager`] and runs its
//! operations in order:
//!
//! 1. `data_ingestion`: `download_file`, `unzip_and_clean`
//! 2. `prepare_base_model`: `get_base_model`, `update_base_model`
//! 3. `training`: `get_base_model`, `train_valid_generator`, `train`
//! 4. `evaluation`: `evaluation`, `save_score`
//!
//! Stages communicate only through files under the artifacts root.

pub mod data_ingestion;
pub mod evaluation;
pub mod prepare_base_model;
pub mod training;

pub use data_ingestion::{DataIngestion, ExtractionSummary};
pub use evaluation::{Evaluation, Score};
pub use prepare_base_model::PrepareBaseModel;
pub use training::{EpochMetrics, Training, TrainingHistory};

use tracing::info;

use crate::backend::{default_device, DefaultBackend, TrainingBackend};
use crate::config::ConfigurationManager;
use crate::utils::error::Result;

pub const STAGE_DATA_INGESTION: &str = "Data Ingestion";
pub const STAGE_PREPARE_BASE_MODEL: &str = "Prepare Base Model";
pub const STAGE_TRAINING: &str = "Training";
pub const STAGE_EVALUATION: &str = "Evaluation";

pub fn run_data_ingestion(manager: &ConfigurationManager) -> Result<ExtractionSummary> {
    info!(">>>>>> stage {} started <<<<<<", STAGE_DATA_INGESTION);
    let stage = DataIngestion::new(manager.get_data_ingestion_config()?);
    stage.download_file()?;
    let summary = stage.unzip_and_clean()?;
    info!(">>>>>> stage {} completed <<<<<<", STAGE_DATA_INGESTION);
    Ok(summary)
}

pub fn run_prepare_base_model(manager: &ConfigurationManager) -> Result<()> {
    info!(">>>>>> stage {} started <<<<<<", STAGE_PREPARE_BASE_MODEL);
    let mut stage = PrepareBaseModel::<DefaultBackend>::new(
        manager.get_prepare_base_model_config()?,
        default_device(),
    );
    stage.get_base_model()?;
    stage.update_base_model()?;
    info!(">>>>>> stage {} completed <<<<<<", STAGE_PREPARE_BASE_MODEL);
    Ok(())
}

pub fn run_training(manager: &ConfigurationManager) -> Result<TrainingHistory> {
    info!(">>>>>> stage {} started <<<<<<", STAGE_TRAINING);
    let mut stage =
        Training::<TrainingBackend>::new(manager.get_training_config()?, default_device());
    stage.get_base_model()?;
    stage.train_valid_generator()?;
    let history = stage.train()?;
    info!(">>>>>> stage {} completed <<<<<<", STAGE_TRAINING);
    Ok(history)
}

pub fn run_evaluation(manager: &ConfigurationManager) -> Result<Score> {
    info!(">>>>>> stage {} started <<<<<<", STAGE_EVALUATION);
    let mut stage =
        Evaluation::<DefaultBackend>::new(manager.get_validation_config()?, default_device());
    let score = *stage.evaluation()?;
    stage.save_score()?;
    info!(">>>>>> stage {} completed <<<<<<", STAGE_EVALUATION);
    Ok(score)
}

/// Run all four stages in order, stopping at the first failure
pub fn run_pipeline(manager: &ConfigurationManager) -> Result<Score> {
    run_data_ingestion(manager)?;
    run_prepare_base_model(manager)?;
    run_training(manager)?;
    run_evaluation(manager)
}
