//! Stage 03: fine-tune the adapted model
//!
//! Uses a custom training loop rather than burn's `Learner`: frozen backbone
//! layers carry no gradients, so the optimizer only touches trainable
//! parameters.

use std::path::Path;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer, SgdConfig},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::evaluation::evaluate_batches;
use crate::config::TrainingConfig;
use crate::dataset::{AugmentationConfig, DataFeeder, FeederConfig};
use crate::model::artifact::{load_compiled_model, save_compiled_model};
use crate::model::classifier::{CompiledModel, ImageClassifier};
use crate::utils::common::save_json;
use crate::utils::error::{ClassifierError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, PassMetrics, RunningAverage};

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// Per-epoch metrics of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }
}

pub struct Training<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
    model: Option<CompiledModel<B>>,
    train_feeder: Option<DataFeeder>,
    valid_feeder: Option<DataFeeder>,
}

impl<B: AutodiffBackend> Training<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            model: None,
            train_feeder: None,
            valid_feeder: None,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&CompiledModel<B>> {
        self.model.as_ref()
    }

    pub fn train_feeder(&self) -> Option<&DataFeeder> {
        self.train_feeder.as_ref()
    }

    pub fn valid_feeder(&self) -> Option<&DataFeeder> {
        self.valid_feeder.as_ref()
    }

    /// Load the adapted model written by the preparation stage
    pub fn get_base_model(&mut self) -> Result<&CompiledModel<B>> {
        let model = load_compiled_model::<B>(&self.config.updated_base_model_path, &self.device)?;
        info!(
            "Loaded model from {} ({} of {} backbone layers frozen)",
            self.config.updated_base_model_path.display(),
            model.network.backbone.frozen_layers(),
            model.network.backbone.num_layers()
        );
        Ok(self.model.insert(model))
    }

    /// Build the training and validation feeders over `training_data`
    pub fn train_valid_generator(&mut self) -> Result<()> {
        let [height, width, _] = self.config.params_image_size;
        let batch_size = self.config.params_batch_size;
        let seed = self.config.params_seed;

        let augmentation = self
            .config
            .params_is_augmentation
            .then(AugmentationConfig::default);

        let valid = DataFeeder::from_directory(
            &self.config.training_data,
            FeederConfig::validation(height, width, batch_size, seed),
        )?;
        let train = DataFeeder::from_directory(
            &self.config.training_data,
            FeederConfig::training(height, width, batch_size, augmentation, seed),
        )?;

        self.valid_feeder = Some(valid);
        self.train_feeder = Some(train);
        Ok(())
    }

    /// Run `params_epochs` epochs of SGD, then save the model and its history
    pub fn train(&mut self) -> Result<TrainingHistory> {
        let model = self
            .model
            .take()
            .ok_or_else(|| ClassifierError::Stage("train called before get_base_model".into()))?;
        let (Some(train_feeder), Some(valid_feeder)) = (&self.train_feeder, &self.valid_feeder)
        else {
            self.model = Some(model);
            return Err(ClassifierError::Stage(
                "train called before train_valid_generator".into(),
            ));
        };

        if let Err(e) = check_feeder(train_feeder, &model) {
            self.model = Some(model);
            return Err(e);
        }
        if valid_feeder.samples() == 0 {
            warn!("Validation split is empty; epochs will report training metrics only");
        }

        let epochs = self.config.params_epochs;
        let steps = train_feeder.steps();
        let learning_rate = model.learning_rate();
        info!(
            "Training for {} epochs: {} steps per epoch, {} validation steps, learning rate {}",
            epochs,
            steps,
            valid_feeder.steps(),
            learning_rate
        );

        let CompiledModel {
            mut network,
            backbone,
            compile,
        } = model;
        let mut optimizer = SgdConfig::new().init::<B, ImageClassifier<B>>();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut history = TrainingHistory::default();
        let mut logger = TrainingLogger::new(epochs);

        for epoch in 0..epochs {
            logger.start_epoch(epoch);
            let mut loss = RunningAverage::new();
            let mut accuracy = AccuracyTracker::new();

            let pb = ProgressBar::new(steps as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );

            for indices in train_feeder.epoch_indices(epoch) {
                pb.inc(1);
                let Some(batch) = train_feeder.load_batch::<B>(&indices, &self.device) else {
                    continue;
                };
                let samples = batch.targets.dims()[0];

                let logits = network.forward_logits(batch.images);
                let batch_loss = loss_fn.forward(logits.clone(), batch.targets.clone());

                let loss_value: f64 = batch_loss.clone().into_scalar().elem();
                let correct: i64 = logits
                    .argmax(1)
                    .flatten::<1>(0, 1)
                    .equal(batch.targets)
                    .int()
                    .sum()
                    .into_scalar()
                    .elem();
                loss.add(loss_value, samples);
                accuracy.add(correct as usize, samples);
                pb.set_message(format!("loss: {:.4}", loss.average()));

                let grads = batch_loss.backward();
                let grads = GradientsParams::from_grads(grads, &network);
                network = optimizer.step(learning_rate, network, grads);
            }
            pb.finish_and_clear();

            let train_metrics = PassMetrics::from_trackers(&loss, &accuracy);
            let val_metrics = (valid_feeder.samples() > 0).then(|| {
                evaluate_batches(
                    &network.valid(),
                    valid_feeder,
                    &valid_feeder.epoch_indices(epoch),
                    &self.device,
                )
            });
            logger.end_epoch(&train_metrics, val_metrics.as_ref());

            history.epochs.push(EpochMetrics {
                epoch: epoch + 1,
                loss: train_metrics.loss,
                accuracy: train_metrics.accuracy,
                val_loss: val_metrics.map(|m| m.loss),
                val_accuracy: val_metrics.map(|m| m.accuracy),
            });
        }

        let final_accuracy = history
            .last()
            .map(|m| m.val_accuracy.unwrap_or(m.accuracy))
            .unwrap_or(0.0);
        logger.log_complete(final_accuracy);

        let trained = CompiledModel {
            network,
            backbone,
            compile,
        };
        save_compiled_model(&trained, &self.config.trained_model_path)?;
        save_json(&self.config.history_path(), &history)?;
        self.model = Some(trained);

        Ok(history)
    }

    pub fn trained_model_path(&self) -> &Path {
        &self.config.trained_model_path
    }
}

fn check_feeder<B: AutodiffBackend>(feeder: &DataFeeder, model: &CompiledModel<B>) -> Result<()> {
    if feeder.samples() == 0 {
        return Err(ClassifierError::Dataset(
            "No training images found".to_string(),
        ));
    }
    if feeder.num_classes() != model.num_classes() {
        return Err(ClassifierError::Dataset(format!(
            "Model predicts {} classes but the dataset has {} ({})",
            model.num_classes(),
            feeder.num_classes(),
            feeder.class_names().join(", ")
        )));
    }
    Ok(())
}
