//! Stage 04: score the trained model and write scores.json

use anyhow::{Context, Result};
use tracing::{error, info};

use cnn_classifier::config::ConfigurationManager;
use cnn_classifier::stages::{run_evaluation, STAGE_EVALUATION};
use cnn_classifier::utils::logging::init_default_logging;

fn main() -> Result<()> {
    let _ = init_default_logging();

    let score = ConfigurationManager::from_default_paths()
        .and_then(|manager| run_evaluation(&manager))
        .map_err(|e| {
            error!("stage {} failed: {}", STAGE_EVALUATION, e);
            e
        })
        .context("evaluation failed")?;

    info!("loss: {:.4}, accuracy: {:.4}", score.loss, score.accuracy);
    Ok(())
}
