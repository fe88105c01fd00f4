//! Stage 02: build the backbone and adapt it to the target classes

use anyhow::Result;
use tracing::error;

use cnn_classifier::config::ConfigurationManager;
use cnn_classifier::stages::{run_prepare_base_model, STAGE_PREPARE_BASE_MODEL};
use cnn_classifier::utils::logging::init_default_logging;

fn main() -> Result<()> {
    let _ = init_default_logging();

    let outcome = ConfigurationManager::from_default_paths().and_then(|manager| run_prepare_base_model(&manager));
    if let Err(e) = outcome {
        error!("stage {} failed: {}", STAGE_PREPARE_BASE_MODEL, e);
        return Err(e.into());
    }
    Ok(())
}
