//! Stage 04: score the trained model on the validation split

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EvaluationConfig;
use crate::dataset::{DataFeeder, FeederConfig};
use crate::model::artifact::load_compiled_model;
use crate::model::classifier::ImageClassifier;
use crate::utils::common::save_json;
use crate::utils::error::{ClassifierError, Result};
use crate::utils::metrics::{AccuracyTracker, PassMetrics, RunningAverage};

/// Loss and accuracy written to the score file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub loss: f64,
    pub accuracy: f64,
}

impl From<PassMetrics> for Score {
    fn from(metrics: PassMetrics) -> Self {
        Self {
            loss: metrics.loss,
            accuracy: metrics.accuracy,
        }
    }
}

/// Sample-weighted mean loss and accuracy of `network` over the given index chunks
pub fn evaluate_batches<B: Backend>(
    network: &ImageClassifier<B>,
    feeder: &DataFeeder,
    chunks: &[Vec<usize>],
    device: &B::Device,
) -> PassMetrics {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut loss = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();

    for indices in chunks {
        let Some(batch) = feeder.load_batch::<B>(indices, device) else {
            continue;
        };
        let samples = batch.targets.dims()[0];

        let logits = network.forward_logits(batch.images);
        let batch_loss: f64 = loss_fn
            .forward(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        let correct: i64 = logits
            .argmax(1)
            .flatten::<1>(0, 1)
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        loss.add(batch_loss, samples);
        accuracy.add(correct as usize, samples);
    }

    PassMetrics::from_trackers(&loss, &accuracy)
}

pub struct Evaluation<B: Backend> {
    config: EvaluationConfig,
    device: B::Device,
    score: Option<Score>,
}

impl<B: Backend> Evaluation<B> {
    pub fn new(config: EvaluationConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            score: None,
        }
    }

    pub fn score(&self) -> Option<&Score> {
        self.score.as_ref()
    }

    /// Load the trained model and score it in one pass over the validation split
    pub fn evaluation(&mut self) -> Result<&Score> {
        let model = load_compiled_model::<B>(&self.config.path_of_model, &self.device)?;

        let [height, width, _] = self.config.params_image_size;
        let feeder = DataFeeder::from_directory(
            &self.config.training_data,
            FeederConfig::validation(
                height,
                width,
                self.config.params_batch_size,
                self.config.params_seed,
            ),
        )?;

        if feeder.samples() == 0 {
            return Err(ClassifierError::Dataset(format!(
                "No validation images found in {}",
                self.config.training_data.display()
            )));
        }
        if feeder.num_classes() != model.num_classes() {
            return Err(ClassifierError::Dataset(format!(
                "Model predicts {} classes but {} has {}",
                model.num_classes(),
                self.config.training_data.display(),
                feeder.num_classes()
            )));
        }

        let metrics = evaluate_batches(
            &model.network,
            &feeder,
            &feeder.full_pass_indices(),
            &self.device,
        );
        info!(
            "Evaluation on {} images: loss = {:.4}, accuracy = {:.4}",
            feeder.samples(),
            metrics.loss,
            metrics.accuracy
        );

        Ok(self.score.insert(metrics.into()))
    }

    /// Write the stored score as JSON, replacing any previous file
    pub fn save_score(&self) -> Result<()> {
        let score = self.score.as_ref().ok_or_else(|| {
            ClassifierError::Stage("save_score called before evaluation".into())
        })?;
        save_json(&self.config.score_path, score)
    }
}
