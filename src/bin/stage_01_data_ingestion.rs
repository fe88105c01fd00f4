//! Stage 01: download the dataset archive and extract its images

use anyhow::Result;
use tracing::error;

use cnn_classifier::config::ConfigurationManager;
use cnn_classifier::stages::{run_data_ingestion, STAGE_DATA_INGESTION};
use cnn_classifier::utils::logging::init_default_logging;

fn main() -> Result<()> {
    let _ = init_default_logging();

    let outcome = ConfigurationManager::from_default_paths().and_then(|manager| run_data_ingestion(&manager));
    if let Err(e) = outcome {
        error!("stage {} failed: {}", STAGE_DATA_INGESTION, e);
        return Err(e.into());
    }
    Ok(())
}
