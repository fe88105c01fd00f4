//! Transfer-learning classifier: backbone + flatten + dense softmax head

use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::backbone::{frozen_prefix_len, Backbone, BackboneConfig, LayerKind};
use crate::utils::format_number;

/// Optimizer settings recorded at compile time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum OptimizerSpec {
    Sgd { learning_rate: f64 },
}

impl OptimizerSpec {
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerSpec::Sgd { learning_rate } => *learning_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    CategoricalCrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Accuracy,
}

/// Optimizer, loss and tracked metrics of a compiled model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileSpec {
    pub optimizer: OptimizerSpec,
    pub loss: LossKind,
    pub metrics: Vec<MetricKind>,
}

impl CompileSpec {
    pub fn sgd(learning_rate: f64) -> Self {
        Self {
            optimizer: OptimizerSpec::Sgd { learning_rate },
            loss: LossKind::CategoricalCrossEntropy,
            metrics: vec![MetricKind::Accuracy],
        }
    }
}

/// Output activation of the classification head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Softmax,
}

/// Backbone followed by a flattened dense head
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub backbone: Backbone<B>,
    pub head: Linear<B>,
}

impl<B: Backend> ImageClassifier<B> {
    /// Raw class scores of shape [batch_size, num_classes]
    pub fn forward_logits(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x).flatten();
        self.head.forward(features)
    }

    /// Class probabilities of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.head.weight.dims()[1]
    }
}

/// A backbone together with the configuration that built it
#[derive(Debug, Clone)]
pub struct BaseModel<B: Backend> {
    pub config: BackboneConfig,
    pub network: Backbone<B>,
}

impl<B: Backend> BaseModel<B> {
    pub fn new(config: BackboneConfig, network: Backbone<B>) -> Self {
        Self { config, network }
    }

    pub fn layers(&self) -> Vec<LayerSummary> {
        summarize_backbone(&self.config, &self.network)
    }
}

/// One row of a model summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub name: String,
    pub kind: String,
    pub trainable: bool,
    pub params: usize,
}

/// Classifier plus its compile settings
#[derive(Debug, Clone)]
pub struct CompiledModel<B: Backend> {
    pub network: ImageClassifier<B>,
    pub backbone: BackboneConfig,
    pub compile: CompileSpec,
}

impl<B: Backend> CompiledModel<B> {
    pub fn num_classes(&self) -> usize {
        self.network.num_classes()
    }

    pub fn head_activation(&self) -> Activation {
        Activation::Softmax
    }

    pub fn learning_rate(&self) -> f64 {
        self.compile.optimizer.learning_rate()
    }

    /// Backbone layers followed by the flatten step and the head
    pub fn layers(&self) -> Vec<LayerSummary> {
        let mut layers = summarize_backbone(&self.backbone, &self.network.backbone);
        layers.push(LayerSummary {
            name: "flatten".to_string(),
            kind: "Flatten".to_string(),
            trainable: true,
            params: 0,
        });
        layers.push(LayerSummary {
            name: "dense".to_string(),
            kind: "Dense(softmax)".to_string(),
            trainable: true,
            params: self.network.head.num_params(),
        });
        layers
    }

    /// Log a per-layer table with parameter totals
    pub fn summary(&self) {
        let layers = self.layers();
        info!("{:<16} {:<16} {:>12} {:>10}", "Layer", "Type", "Params", "Trainable");
        for layer in &layers {
            info!(
                "{:<16} {:<16} {:>12} {:>10}",
                layer.name,
                layer.kind,
                format_number(layer.params),
                layer.trainable
            );
        }
        let total: usize = layers.iter().map(|l| l.params).sum();
        let trainable: usize = layers.iter().filter(|l| l.trainable).map(|l| l.params).sum();
        info!("Total params: {}", format_number(total));
        info!("Trainable params: {}", format_number(trainable));
        info!("Non-trainable params: {}", format_number(total - trainable));
    }
}

fn summarize_backbone<B: Backend>(config: &BackboneConfig, backbone: &Backbone<B>) -> Vec<LayerSummary> {
    config
        .layer_names()
        .into_iter()
        .zip(backbone.layers())
        .enumerate()
        .map(|(i, ((name, kind), layer))| LayerSummary {
            name,
            kind: match kind {
                LayerKind::Conv2d => "Conv2D",
                LayerKind::MaxPool2d => "MaxPooling2D",
                LayerKind::Dense => "Dense(relu)",
                LayerKind::Predictions => "Dense(softmax)",
            }
            .to_string(),
            trainable: backbone.is_layer_trainable(i),
            params: layer.num_params(),
        })
        .collect()
}

/// Adapt `model` for a `classes`-way task
///
/// Freezes the backbone according to `freeze_all` / `freeze_till`, appends a
/// flatten step and a dense softmax head, and compiles with SGD and categorical
/// cross-entropy. Performs no I/O.
pub fn prepare_full_model<B: Backend>(
    model: BaseModel<B>,
    classes: usize,
    freeze_all: bool,
    freeze_till: Option<i64>,
    learning_rate: f64,
) -> CompiledModel<B> {
    let BaseModel { config, network } = model;
    let frozen = frozen_prefix_len(network.num_layers(), freeze_all, freeze_till);
    let backbone = network.freeze_leading(frozen);

    let device = backbone.devices().into_iter().next().unwrap_or_default();
    let head = LinearConfig::new(backbone.output_features(), classes).init(&device);

    CompiledModel {
        network: ImageClassifier { backbone, head },
        backbone: config,
        compile: CompileSpec::sgd(learning_rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::Architecture;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn base_model() -> BaseModel<TestBackend> {
        let device = Default::default();
        let config = BackboneConfig::new([32, 32, 3]).with_architecture(Architecture::Compact);
        let network = config.init(&device);
        BaseModel::new(config, network)
    }

    #[test]
    fn test_freeze_all_with_two_class_head() {
        let model = prepare_full_model(base_model(), 2, true, None, 0.01);

        let backbone = &model.network.backbone;
        for (i, layer) in backbone.layers().iter().enumerate() {
            assert!(!backbone.is_layer_trainable(i));
            assert_ne!(layer.requires_grad(), Some(true));
        }

        assert_eq!(model.num_classes(), 2);
        assert_eq!(model.head_activation(), Activation::Softmax);
        assert_eq!(model.compile.optimizer, OptimizerSpec::Sgd { learning_rate: 0.01 });
        assert_eq!(model.compile.loss, LossKind::CategoricalCrossEntropy);
        assert_eq!(model.compile.metrics, vec![MetricKind::Accuracy]);

        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([4, 3, 32, 32], &device);
        let probs = model.network.forward(input);
        assert_eq!(probs.dims(), [4, 2]);
        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_freeze_till_keeps_last_layers_trainable() {
        let model = prepare_full_model(base_model(), 3, false, Some(2), 0.001);
        let backbone = &model.network.backbone;
        let n = backbone.num_layers();

        let trainable: Vec<usize> = (0..n).filter(|&i| backbone.is_layer_trainable(i)).collect();
        assert_eq!(trainable, vec![n - 2, n - 1]);
        assert_eq!(backbone.layers()[0].requires_grad(), Some(false));
        assert_eq!(backbone.layers()[n - 2].requires_grad(), Some(true));
        assert_eq!(model.num_classes(), 3);
        assert_eq!(model.learning_rate(), 0.001);
    }

    #[test]
    fn test_no_freezing_for_non_positive_freeze_till() {
        let model = prepare_full_model(base_model(), 2, false, Some(0), 0.01);
        let backbone = &model.network.backbone;
        assert_eq!(backbone.frozen_layers(), 0);
        assert!((0..backbone.num_layers()).all(|i| backbone.is_layer_trainable(i)));
    }

    #[test]
    fn test_layer_summary_lists_head_last() {
        let model = prepare_full_model(base_model(), 2, true, None, 0.01);
        let layers = model.layers();
        let last = layers.last().unwrap();
        assert_eq!(last.name, "dense");
        assert_eq!(last.params, 16 * 8 * 8 * 2 + 2);
        assert!(layers[..layers.len() - 2].iter().all(|l| !l.trainable));
    }
}
