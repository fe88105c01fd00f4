//! VGG-style convolutional backbone
//!
//! The backbone is a flat list of layers so that freezing can address them by
//! position. Presets mirror the VGG family; `compact` keeps the same layer
//! vocabulary with far fewer filters for CPU runs.

use std::fmt;
use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{
        activation::{relu, softmax},
        backend::Backend,
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

use crate::utils::error::{self, ClassifierError};

/// Named backbone presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[default]
    Vgg16,
    Vgg11,
    Compact,
}

impl Architecture {
    /// `(convolutions, filters)` for each block; every block ends with a 2x2 max pool
    pub fn blocks(&self) -> &'static [(usize, usize)] {
        match self {
            Architecture::Vgg16 => &[(2, 64), (2, 128), (3, 256), (3, 512), (3, 512)],
            Architecture::Vgg11 => &[(1, 64), (1, 128), (2, 256), (2, 512), (2, 512)],
            Architecture::Compact => &[(1, 8), (1, 16)],
        }
    }

    /// Torchvision download for the ImageNet weights of this preset
    pub fn imagenet_weights_url(&self) -> Option<&'static str> {
        match self {
            Architecture::Vgg16 => Some("https://download.pytorch.org/models/vgg16-397923af.pth"),
            Architecture::Vgg11 => Some("https://download.pytorch.org/models/vgg11-8a719046.pth"),
            Architecture::Compact => None,
        }
    }

    /// Width of the two hidden dense layers of the original classifier top
    pub fn top_units(&self) -> usize {
        match self {
            Architecture::Vgg16 | Architecture::Vgg11 => 4096,
            Architecture::Compact => 64,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::Vgg16 => write!(f, "vgg16"),
            Architecture::Vgg11 => write!(f, "vgg11"),
            Architecture::Compact => write!(f, "compact"),
        }
    }
}

/// Where the backbone's initial weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightSource {
    /// Random initialization
    Random,
    /// Torchvision ImageNet weights for the configured architecture
    ImageNet,
    /// A weights file on disk, read according to its [`WeightFormat`]
    File(PathBuf),
    /// A weights file served over http(s), downloaded once
    Url(String),
}

impl WeightSource {
    /// Interpret the `WEIGHTS` hyperparameter
    pub fn parse(value: Option<&str>) -> error::Result<Self> {
        let Some(value) = value.map(str::trim) else {
            return Ok(WeightSource::Random);
        };

        match value.to_lowercase().as_str() {
            "" | "none" | "null" | "random" => Ok(WeightSource::Random),
            "imagenet" => Ok(WeightSource::ImageNet),
            lower if lower.starts_with("http://") || lower.starts_with("https://") => {
                Ok(WeightSource::Url(value.to_string()))
            }
            lower if lower.contains("://") => Err(ClassifierError::Config(format!(
                "WEIGHTS must be none, imagenet, a file path or an http(s) URL, got '{}'",
                value
            ))),
            _ => Ok(WeightSource::File(PathBuf::from(value))),
        }
    }
}

/// On-disk layout of a weights file, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// Burn record written by `CompactRecorder`
    Record,
    /// PyTorch `state_dict` saved with `torch.save` (`.pth`, `.pt`)
    PyTorch,
    /// Safetensors file with PyTorch tensor names
    Safetensors,
}

impl WeightFormat {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pth") | Some("pt") => WeightFormat::PyTorch,
            Some("safetensors") => WeightFormat::Safetensors,
            _ => WeightFormat::Record,
        }
    }
}

/// Kind of a backbone layer, used for summaries and freezing reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Conv2d,
    MaxPool2d,
    Dense,
    Predictions,
}

/// Configuration for the backbone network
#[derive(Config, Debug, PartialEq)]
pub struct BackboneConfig {
    /// Input shape as `[height, width, channels]`
    pub input_shape: [usize; 3],

    #[config(default = "Architecture::Vgg16")]
    pub architecture: Architecture,

    /// Keep the original dense classifier on top of the convolutional blocks
    #[config(default = "false")]
    pub include_top: bool,

    /// Output units of the original classifier when `include_top` is set
    #[config(default = "1000")]
    pub top_classes: usize,
}

impl BackboneConfig {
    /// Layer names and kinds in forward order
    pub fn layer_names(&self) -> Vec<(String, LayerKind)> {
        let mut names = Vec::new();
        for (block, &(convs, _)) in self.architecture.blocks().iter().enumerate() {
            for conv in 0..convs {
                names.push((format!("block{}_conv{}", block + 1, conv + 1), LayerKind::Conv2d));
            }
            names.push((format!("block{}_pool", block + 1), LayerKind::MaxPool2d));
        }
        if self.include_top {
            names.push(("fc1".to_string(), LayerKind::Dense));
            names.push(("fc2".to_string(), LayerKind::Dense));
            names.push(("predictions".to_string(), LayerKind::Predictions));
        }
        names
    }

    /// Spatial size of the last feature map as `(channels, height, width)`
    pub fn feature_map_shape(&self) -> (usize, usize, usize) {
        let [mut height, mut width, _] = self.input_shape;
        let mut channels = self.input_shape[2];
        for &(_, filters) in self.architecture.blocks() {
            channels = filters;
            height /= 2;
            width /= 2;
        }
        (channels, height, width)
    }

    /// Length of the flattened backbone output
    pub fn output_features(&self) -> usize {
        if self.include_top {
            return self.top_classes;
        }
        let (channels, height, width) = self.feature_map_shape();
        channels * height * width
    }

    /// Reject shapes the network cannot process
    pub fn validate(&self) -> error::Result<()> {
        let (_, height, width) = self.feature_map_shape();
        if height == 0 || width == 0 {
            let [h, w, _] = self.input_shape;
            return Err(ClassifierError::Config(format!(
                "Input {}x{} is too small for {} ({} pooling stages)",
                h,
                w,
                self.architecture,
                self.architecture.blocks().len()
            )));
        }
        Ok(())
    }

    /// Initialize a backbone with random weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let mut layers = Vec::new();
        let mut in_channels = self.input_shape[2];

        for &(convs, filters) in self.architecture.blocks() {
            for _ in 0..convs {
                let conv = Conv2dConfig::new([in_channels, filters], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device);
                layers.push(BackboneLayer::Conv(conv));
                in_channels = filters;
            }
            layers.push(BackboneLayer::Pool(
                MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            ));
        }

        if self.include_top {
            let (channels, height, width) = self.feature_map_shape();
            let units = self.architecture.top_units();
            layers.push(BackboneLayer::Dense(
                LinearConfig::new(channels * height * width, units).init(device),
            ));
            layers.push(BackboneLayer::Dense(LinearConfig::new(units, units).init(device)));
            layers.push(BackboneLayer::Predictions(
                LinearConfig::new(units, self.top_classes).init(device),
            ));
        }

        Backbone {
            layers,
            frozen: 0,
            features: self.output_features(),
        }
    }
}

/// Intermediate activations flowing through the backbone
#[derive(Debug, Clone)]
pub enum FeatureMap<B: Backend> {
    /// `[batch, channels, height, width]`
    Spatial(Tensor<B, 4>),
    /// `[batch, features]`
    Flat(Tensor<B, 2>),
}

impl<B: Backend> FeatureMap<B> {
    /// Flatten to `[batch, features]`
    pub fn flatten(self) -> Tensor<B, 2> {
        match self {
            FeatureMap::Spatial(x) => {
                let [batch, channels, height, width] = x.dims();
                x.reshape([batch, channels * height * width])
            }
            FeatureMap::Flat(x) => x,
        }
    }

    fn spatial(self) -> Tensor<B, 4> {
        match self {
            FeatureMap::Spatial(x) => x,
            FeatureMap::Flat(x) => {
                let [batch, features] = x.dims();
                x.reshape([batch, features, 1, 1])
            }
        }
    }
}

/// A single backbone layer
#[derive(Module, Debug)]
pub enum BackboneLayer<B: Backend> {
    Conv(Conv2d<B>),
    Pool(MaxPool2d),
    Dense(Linear<B>),
    Predictions(Linear<B>),
}

impl<B: Backend> BackboneLayer<B> {
    pub fn forward(&self, input: FeatureMap<B>) -> FeatureMap<B> {
        match self {
            BackboneLayer::Conv(conv) => FeatureMap::Spatial(relu(conv.forward(input.spatial()))),
            BackboneLayer::Pool(pool) => FeatureMap::Spatial(pool.forward(input.spatial())),
            BackboneLayer::Dense(linear) => FeatureMap::Flat(relu(linear.forward(input.flatten()))),
            BackboneLayer::Predictions(linear) => {
                FeatureMap::Flat(softmax(linear.forward(input.flatten()), 1))
            }
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            BackboneLayer::Conv(_) => LayerKind::Conv2d,
            BackboneLayer::Pool(_) => LayerKind::MaxPool2d,
            BackboneLayer::Dense(_) => LayerKind::Dense,
            BackboneLayer::Predictions(_) => LayerKind::Predictions,
        }
    }

    /// Whether the layer's weights take gradient updates; `None` for parameterless layers
    pub fn requires_grad(&self) -> Option<bool> {
        match self {
            BackboneLayer::Conv(conv) => Some(conv.weight.val().is_require_grad()),
            BackboneLayer::Dense(linear) | BackboneLayer::Predictions(linear) => {
                Some(linear.weight.val().is_require_grad())
            }
            BackboneLayer::Pool(_) => None,
        }
    }
}

/// Convolutional feature extractor
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    layers: Vec<BackboneLayer<B>>,
    /// Number of leading layers excluded from training
    frozen: usize,
    /// Flattened output length
    features: usize,
}

impl<B: Backend> Backbone<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    pub fn forward(&self, x: Tensor<B, 4>) -> FeatureMap<B> {
        self.layers
            .iter()
            .fold(FeatureMap::Spatial(x), |features, layer| layer.forward(features))
    }

    pub fn layers(&self) -> &[BackboneLayer<B>] {
        &self.layers
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn frozen_layers(&self) -> usize {
        self.frozen
    }

    pub fn output_features(&self) -> usize {
        self.features
    }

    pub fn is_layer_trainable(&self, index: usize) -> bool {
        index >= self.frozen && index < self.layers.len()
    }

    /// Freeze the first `count` layers; later layers are left as they are
    pub fn freeze_leading(mut self, count: usize) -> Self {
        let count = count.min(self.layers.len());
        self.layers = self
            .layers
            .into_iter()
            .enumerate()
            .map(|(i, layer)| if i < count { layer.no_grad() } else { layer })
            .collect();
        self.frozen = count;
        self
    }

    pub(crate) fn into_layers(self) -> Vec<BackboneLayer<B>> {
        self.layers
    }

    /// Reassemble a backbone from layers taken out with `into_layers`; nothing is frozen
    pub(crate) fn from_layers(layers: Vec<BackboneLayer<B>>, features: usize) -> Self {
        Self {
            layers,
            frozen: 0,
            features,
        }
    }
}

/// Number of leading layers to freeze out of `num_layers`
///
/// `freeze_all` wins; otherwise a positive `freeze_till` keeps that many trailing
/// layers trainable; anything else freezes nothing.
pub fn frozen_prefix_len(num_layers: usize, freeze_all: bool, freeze_till: Option<i64>) -> usize {
    if freeze_all {
        return num_layers;
    }
    match freeze_till {
        Some(keep) if keep > 0 => num_layers.saturating_sub(keep as usize),
        _ => 0,
    }
}
