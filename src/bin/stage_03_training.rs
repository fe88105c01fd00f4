//! Stage 03: fine-tune the adapted model

use anyhow::Result;
use tracing::{error, info};

use cnn_classifier::config::ConfigurationManager;
use cnn_classifier::stages::{run_training, STAGE_TRAINING};
use cnn_classifier::utils::logging::init_default_logging;

fn main() -> Result<()> {
    let _ = init_default_logging();

    match ConfigurationManager::from_default_paths().and_then(|manager| run_training(&manager)) {
        Ok(history) => {
            if let Some(last) = history.last() {
                info!(
                    "final epoch {}: loss {:.4}, accuracy {:.4}",
                    last.epoch, last.loss, last.accuracy
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("stage {} failed: {}", STAGE_TRAINING, e);
            Err(e.into())
        }
    }
}
