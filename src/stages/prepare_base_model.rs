//! Stage 02: build the backbone and adapt it to the target classes

use std::fs;
use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use tracing::info;

use crate::config::PrepareBaseModelConfig;
use crate::model::artifact::{save_base_model, save_compiled_model};
use crate::model::backbone::{Backbone, BackboneConfig, WeightFormat, WeightSource};
use crate::model::classifier::{prepare_full_model, BaseModel, CompiledModel};
use crate::model::pretrained::load_torchvision;
use crate::utils::error::{ClassifierError, Result};
use crate::utils::http::{download_to_file, validate_source_url};

pub struct PrepareBaseModel<B: Backend> {
    config: PrepareBaseModelConfig,
    device: B::Device,
    model: Option<BaseModel<B>>,
    full_model: Option<CompiledModel<B>>,
}

impl<B: Backend> PrepareBaseModel<B> {
    pub fn new(config: PrepareBaseModelConfig, device: B::Device) -> Self {
        Self {
            config,
            device,
            model: None,
            full_model: None,
        }
    }

    pub fn config(&self) -> &PrepareBaseModelConfig {
        &self.config
    }

    pub fn model(&self) -> Option<&BaseModel<B>> {
        self.model.as_ref()
    }

    pub fn full_model(&self) -> Option<&CompiledModel<B>> {
        self.full_model.as_ref()
    }

    fn backbone_config(&self) -> BackboneConfig {
        BackboneConfig::new(self.config.params_image_size)
            .with_architecture(self.config.params_architecture)
            .with_include_top(self.config.params_include_top)
    }

    /// Instantiate the backbone and persist it unmodified to `base_model_path`
    pub fn get_base_model(&mut self) -> Result<&BaseModel<B>> {
        let backbone_config = self.backbone_config();
        backbone_config.validate()?;
        info!(
            "Building {} backbone for input {:?} (include_top: {})",
            backbone_config.architecture, backbone_config.input_shape, backbone_config.include_top
        );

        let network = backbone_config.init::<B>(&self.device);
        let network = self.apply_weights(network, &backbone_config)?;
        let model = BaseModel::new(backbone_config, network);

        save_base_model(&model, &self.config.base_model_path)?;
        Ok(self.model.insert(model))
    }

    fn apply_weights(&self, network: Backbone<B>, config: &BackboneConfig) -> Result<Backbone<B>> {
        let weights = match &self.config.params_weights {
            WeightSource::Random => {
                info!("Using randomly initialized weights");
                return Ok(network);
            }
            WeightSource::ImageNet => {
                let url = config.architecture.imagenet_weights_url().ok_or_else(|| {
                    ClassifierError::Config(format!(
                        "no ImageNet weights are published for the {} architecture",
                        config.architecture
                    ))
                })?;
                self.fetch_weights(url)?
            }
            WeightSource::File(path) => path.clone(),
            WeightSource::Url(url) => self.fetch_weights(url)?,
        };

        match WeightFormat::of(&weights) {
            WeightFormat::Record => {
                info!("Loading backbone weights from {}", weights.display());
                network
                    .load_file(weights.clone(), &CompactRecorder::new(), &self.device)
                    .map_err(|e| ClassifierError::ModelLoad(weights, e.to_string()))
            }
            format => load_torchvision(network, config, &weights, format, &self.device),
        }
    }

    /// Download remote weights into `<root_dir>/weights/` unless already cached
    fn fetch_weights(&self, source: &str) -> Result<PathBuf> {
        let url = validate_source_url(source)?;
        let file_name = url
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .unwrap_or("backbone.mpk")
            .to_string();
        let destination = self.config.root_dir.join("weights").join(file_name);

        if destination.exists() {
            info!("Using cached weights at {}", destination.display());
        } else if let Err(e) = download_to_file(&url, &destination) {
            let _ = fs::remove_file(&destination);
            return Err(e);
        }
        Ok(destination)
    }

    /// Freeze the whole backbone, add the classification head and persist it
    pub fn update_base_model(&mut self) -> Result<&CompiledModel<B>> {
        let model = self.model.clone().ok_or_else(|| {
            ClassifierError::Stage("update_base_model called before get_base_model".into())
        })?;

        let full_model = prepare_full_model(
            model,
            self.config.params_classes,
            true,
            None,
            self.config.params_learning_rate,
        );
        full_model.summary();

        save_compiled_model(&full_model, &self.config.updated_base_model_path)?;
        Ok(self.full_model.insert(full_model))
    }

    pub fn updated_base_model_path(&self) -> &Path {
        &self.config.updated_base_model_path
    }
}
