//! Torchvision weights for the VGG presets
//!
//! Torchvision numbers `features.N` over every conv, ReLU and pool module and
//! keeps the dense top in `classifier.{0,3,6}`. The backbone only counts layers
//! with a forward step of its own, so tensor names are remapped onto two flat
//! stacks, loaded there, and moved into the backbone layer by layer.

use std::path::Path;

use burn::{
    module::Module,
    nn::{conv::Conv2d, Linear},
    record::{FullPrecisionSettings, Record, Recorder, RecorderError},
    tensor::backend::Backend,
};
use burn_import::pytorch::{self, PyTorchFileRecorder};
use burn_import::safetensors::{self, AdapterType, SafetensorsFileRecorder};
use tracing::{debug, info};

use super::backbone::{Backbone, BackboneConfig, BackboneLayer, LayerKind, WeightFormat};
use crate::utils::error::{ClassifierError, Result};

/// Torchvision indexes of the dense top: linear, ReLU, dropout, linear, ReLU, dropout, linear
const CLASSIFIER_INDEXES: [usize; 3] = [0, 3, 6];

#[derive(Module, Debug)]
struct ConvStack<B: Backend> {
    convs: Vec<Conv2d<B>>,
}

#[derive(Module, Debug)]
struct DenseStack<B: Backend> {
    dense: Vec<Linear<B>>,
}

/// `(pattern, replacement)` pairs taking torchvision names to the conv stack
pub fn conv_key_remaps(config: &BackboneConfig) -> Vec<(String, String)> {
    let mut remaps = Vec::new();
    let mut index = 0;
    let mut conv = 0;
    for &(convs, _) in config.architecture.blocks() {
        for _ in 0..convs {
            remaps.push((format!(r"^features\.{}\.(.+)$", index), format!("convs.{}.$1", conv)));
            conv += 1;
            // conv then ReLU
            index += 2;
        }
        // max pool
        index += 1;
    }
    remaps
}

/// `(pattern, replacement)` pairs taking torchvision names to the dense stack
pub fn dense_key_remaps() -> Vec<(String, String)> {
    CLASSIFIER_INDEXES
        .iter()
        .enumerate()
        .map(|(dense, index)| (format!(r"^classifier\.{}\.(.+)$", index), format!("dense.{}.$1", dense)))
        .collect()
}

fn load_stack<B: Backend, R: Record<B>>(
    path: &Path,
    format: WeightFormat,
    remaps: &[(String, String)],
    device: &B::Device,
) -> Result<R> {
    let failed = |e: RecorderError| ClassifierError::ModelLoad(path.to_path_buf(), e.to_string());
    match format {
        WeightFormat::PyTorch => {
            let args = remaps
                .iter()
                .fold(pytorch::LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
                    args.with_key_remap(pattern, replacement)
                });
            <PyTorchFileRecorder<FullPrecisionSettings> as Recorder<B>>::load(
                &PyTorchFileRecorder::default(),
                args,
                device,
            )
            .map_err(failed)
        }
        WeightFormat::Safetensors => {
            let args = remaps.iter().fold(
                safetensors::LoadArgs::new(path.to_path_buf()).with_adapter_type(AdapterType::PyTorch),
                |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
            );
            <SafetensorsFileRecorder<FullPrecisionSettings> as Recorder<B>>::load(
                &SafetensorsFileRecorder::default(),
                args,
                device,
            )
            .map_err(failed)
        }
        WeightFormat::Record => Err(ClassifierError::ModelLoad(
            path.to_path_buf(),
            "burn records are loaded directly, not through torchvision names".into(),
        )),
    }
}

fn check_shape(path: &Path, name: String, expected: &[usize], found: &[usize]) -> Result<()> {
    if expected != found {
        return Err(ClassifierError::ModelLoad(
            path.to_path_buf(),
            format!("{} has shape {:?}, the backbone expects {:?}", name, found, expected),
        ));
    }
    Ok(())
}

/// Replace the weights of `network` with those of a torchvision VGG state dict
///
/// Every convolution must be present with a matching shape; with `include_top`
/// the three dense layers must be as well.
pub fn load_torchvision<B: Backend>(
    network: Backbone<B>,
    config: &BackboneConfig,
    path: &Path,
    format: WeightFormat,
    device: &B::Device,
) -> Result<Backbone<B>> {
    let features = network.output_features();
    let frozen = network.frozen_layers();

    let mut convs = Vec::new();
    let mut dense = Vec::new();
    let mut pools = Vec::new();
    let mut order = Vec::new();
    for layer in network.into_layers() {
        order.push(layer.kind());
        match layer {
            BackboneLayer::Conv(conv) => convs.push(conv),
            BackboneLayer::Pool(pool) => pools.push(pool),
            BackboneLayer::Dense(linear) | BackboneLayer::Predictions(linear) => dense.push(linear),
        }
    }

    let conv_record: ConvStackRecord<B> = load_stack(path, format, &conv_key_remaps(config), device)?;
    if conv_record.convs.len() != convs.len() {
        return Err(ClassifierError::ModelLoad(
            path.to_path_buf(),
            format!(
                "found {} convolutions, {} needs {}",
                conv_record.convs.len(),
                config.architecture,
                convs.len()
            ),
        ));
    }
    for (i, (conv, record)) in convs.iter().zip(&conv_record.convs).enumerate() {
        check_shape(
            path,
            format!("convolution {}", i),
            &conv.weight.val().dims(),
            &record.weight.val().dims(),
        )?;
    }
    let convs = ConvStack { convs }.load_record(conv_record).convs;
    debug!("Loaded {} convolutions from {}", convs.len(), path.display());

    let dense = if dense.is_empty() {
        dense
    } else {
        let dense_record: DenseStackRecord<B> = load_stack(path, format, &dense_key_remaps(), device)?;
        if dense_record.dense.len() != dense.len() {
            return Err(ClassifierError::ModelLoad(
                path.to_path_buf(),
                format!(
                    "found {} dense layers, include_top needs {}",
                    dense_record.dense.len(),
                    dense.len()
                ),
            ));
        }
        for (i, (linear, record)) in dense.iter().zip(&dense_record.dense).enumerate() {
            check_shape(
                path,
                format!("dense layer {}", i),
                &linear.weight.val().dims(),
                &record.weight.val().dims(),
            )?;
        }
        DenseStack { dense }.load_record(dense_record).dense
    };

    let mut convs = convs.into_iter();
    let mut dense = dense.into_iter();
    let mut pools = pools.into_iter();
    let layers = order
        .into_iter()
        .map(|kind| match kind {
            LayerKind::Conv2d => convs.next().map(BackboneLayer::Conv),
            LayerKind::MaxPool2d => pools.next().map(BackboneLayer::Pool),
            LayerKind::Dense => dense.next().map(BackboneLayer::Dense),
            LayerKind::Predictions => dense.next().map(BackboneLayer::Predictions),
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ClassifierError::Model("backbone layers changed while loading weights".into()))?;

    info!("Loaded torchvision weights from {}", path.display());
    Ok(Backbone::from_layers(layers, features).freeze_leading(frozen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::Architecture;
    use burn::backend::NdArray;
    use serde_json::{json, Map, Value};
    use std::fs;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn values(len: usize, offset: f32) -> Vec<f32> {
        (0..len).map(|i| offset + i as f32 * 1e-3).collect()
    }

    fn write_safetensors(path: &Path, tensors: &[(&str, Vec<usize>, Vec<f32>)]) {
        let mut header = Map::new();
        let mut data = Vec::new();
        for (name, shape, values) in tensors {
            let start = data.len();
            for value in values {
                data.extend_from_slice(&value.to_le_bytes());
            }
            header.insert(
                name.to_string(),
                json!({ "dtype": "F32", "shape": shape, "data_offsets": [start, data.len()] }),
            );
        }
        let header = serde_json::to_vec(&Value::Object(header)).unwrap();
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend(header);
        bytes.extend(data);
        fs::write(path, bytes).unwrap();
    }

    /// Torchvision-named tensors for the compact preset at 16x16 with a 5-way top
    fn compact_state_dict(first_kernel: usize) -> Vec<(&'static str, Vec<usize>, Vec<f32>)> {
        let k = first_kernel;
        vec![
            ("features.0.weight", vec![8, 3, k, k], values(8 * 3 * k * k, 0.1)),
            ("features.0.bias", vec![8], values(8, 0.2)),
            ("features.3.weight", vec![16, 8, 3, 3], values(16 * 8 * 9, 0.3)),
            ("features.3.bias", vec![16], values(16, 0.4)),
            ("classifier.0.weight", vec![64, 256], values(64 * 256, 0.5)),
            ("classifier.0.bias", vec![64], values(64, 0.6)),
            ("classifier.3.weight", vec![64, 64], values(64 * 64, 0.7)),
            ("classifier.3.bias", vec![64], values(64, 0.8)),
            ("classifier.6.weight", vec![5, 64], values(5 * 64, 0.9)),
            ("classifier.6.bias", vec![5], values(5, 1.0)),
        ]
    }

    fn compact_config() -> BackboneConfig {
        BackboneConfig::new([16, 16, 3])
            .with_architecture(Architecture::Compact)
            .with_include_top(true)
            .with_top_classes(5)
    }

    #[test]
    fn test_vgg16_remaps_skip_relu_and_pool_indexes() {
        let remaps = conv_key_remaps(&BackboneConfig::new([224, 224, 3]));
        assert_eq!(remaps.len(), 13);
        assert_eq!(remaps[0], (r"^features\.0\.(.+)$".to_string(), "convs.0.$1".to_string()));
        assert_eq!(remaps[1].0, r"^features\.2\.(.+)$");
        assert_eq!(remaps[2].0, r"^features\.5\.(.+)$");
        assert_eq!(remaps[12], (r"^features\.28\.(.+)$".to_string(), "convs.12.$1".to_string()));

        let dense = dense_key_remaps();
        assert_eq!(dense[2], (r"^classifier\.6\.(.+)$".to_string(), "dense.2.$1".to_string()));
    }

    #[test]
    fn test_compact_weights_land_in_backbone_layers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("compact.safetensors");
        let state = compact_state_dict(3);
        write_safetensors(&path, &state);

        let device = Default::default();
        let config = compact_config();
        let network = config.init::<TestBackend>(&device);
        let network = load_torchvision(network, &config, &path, WeightFormat::Safetensors, &device).unwrap();
        assert_eq!(network.num_layers(), config.layer_names().len());

        let layers = network.layers();
        let BackboneLayer::Conv(second_conv) = &layers[2] else {
            panic!("layer 2 should be a convolution");
        };
        let loaded: Vec<f32> = second_conv.weight.val().into_data().to_vec().unwrap();
        assert_eq!(loaded, state[2].2);

        // Torch stores linear weights as [out, in]; burn as [in, out]
        let BackboneLayer::Dense(first_dense) = &layers[4] else {
            panic!("layer 4 should be dense");
        };
        assert_eq!(first_dense.weight.val().dims(), [256, 64]);
        let loaded: Vec<f32> = first_dense.weight.val().into_data().to_vec().unwrap();
        let (out, input) = (1, 2);
        assert_eq!(loaded[input * 64 + out], state[4].2[out * 256 + input]);

        let BackboneLayer::Predictions(predictions) = &layers[6] else {
            panic!("layer 6 should be the predictions layer");
        };
        let bias: Vec<f32> = predictions.bias.as_ref().unwrap().val().into_data().to_vec().unwrap();
        assert_eq!(bias, state[9].2);
    }

    #[test]
    fn test_shape_mismatch_is_model_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrong.safetensors");
        write_safetensors(&path, &compact_state_dict(5));

        let device = Default::default();
        let config = compact_config();
        let network = config.init::<TestBackend>(&device);
        let err = load_torchvision(network, &config, &path, WeightFormat::Safetensors, &device).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_, _)));
    }
}
