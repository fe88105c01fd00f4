//! On-disk model artifacts
//!
//! An artifact at `path` is two files: `<path>.mpk` holds the burn record and
//! `<path>.json` holds a [`ModelManifest`] describing how to rebuild the module
//! before the record is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    nn::LinearConfig,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::backbone::BackboneConfig;
use super::classifier::{BaseModel, CompileSpec, CompiledModel, ImageClassifier};
use crate::utils::common::{append_extension, load_json, save_json};
use crate::utils::error::{ClassifierError, Result};

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Backbone,
    Classifier,
}

/// Sidecar metadata describing a saved model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    pub kind: ArtifactKind,
    pub backbone: BackboneConfig,
    /// Leading backbone layers excluded from training
    pub frozen_layers: usize,
    pub classes: Option<usize>,
    pub compile: Option<CompileSpec>,
    pub num_params: usize,
    pub saved_at: String,
}

/// Path of the weights file for the artifact at `path`
pub fn weights_path(path: &Path) -> PathBuf {
    append_extension(path, "mpk")
}

/// Path of the manifest for the artifact at `path`
pub fn manifest_path(path: &Path) -> PathBuf {
    append_extension(path, "json")
}

pub fn save_base_model<B: Backend>(model: &BaseModel<B>, path: &Path) -> Result<()> {
    let manifest = ModelManifest {
        format_version: MANIFEST_VERSION,
        kind: ArtifactKind::Backbone,
        backbone: model.config.clone(),
        frozen_layers: model.network.frozen_layers(),
        classes: None,
        compile: None,
        num_params: model.network.num_params(),
        saved_at: Utc::now().to_rfc3339(),
    };
    save_record::<_, B>(model.network.clone(), path)?;
    save_json(&manifest_path(path), &manifest)?;
    info!("Saved backbone to {}", weights_path(path).display());
    Ok(())
}

pub fn load_base_model<B: Backend>(path: &Path, device: &B::Device) -> Result<BaseModel<B>> {
    let manifest = load_manifest(path, ArtifactKind::Backbone)?;
    let network = manifest
        .backbone
        .init::<B>(device)
        .load_file(weights_path(path), &CompactRecorder::new(), device)
        .map_err(|e| ClassifierError::ModelLoad(path.to_path_buf(), e.to_string()))?
        .freeze_leading(manifest.frozen_layers);
    Ok(BaseModel::new(manifest.backbone, network))
}

pub fn save_compiled_model<B: Backend>(model: &CompiledModel<B>, path: &Path) -> Result<()> {
    let manifest = ModelManifest {
        format_version: MANIFEST_VERSION,
        kind: ArtifactKind::Classifier,
        backbone: model.backbone.clone(),
        frozen_layers: model.network.backbone.frozen_layers(),
        classes: Some(model.num_classes()),
        compile: Some(model.compile.clone()),
        num_params: model.network.num_params(),
        saved_at: Utc::now().to_rfc3339(),
    };
    save_record::<_, B>(model.network.clone(), path)?;
    save_json(&manifest_path(path), &manifest)?;
    info!("Saved model to {}", weights_path(path).display());
    Ok(())
}

/// Load a classifier saved by [`save_compiled_model`], re-applying its frozen layers
pub fn load_compiled_model<B: Backend>(path: &Path, device: &B::Device) -> Result<CompiledModel<B>> {
    let manifest = load_manifest(path, ArtifactKind::Classifier)?;
    let invalid = |msg: &str| ClassifierError::ModelLoad(path.to_path_buf(), msg.to_string());
    let classes = manifest.classes.ok_or_else(|| invalid("manifest has no class count"))?;
    let compile = manifest
        .compile
        .clone()
        .ok_or_else(|| invalid("manifest has no compile settings"))?;

    let backbone = manifest.backbone.init::<B>(device);
    let head = LinearConfig::new(backbone.output_features(), classes).init(device);
    let network = ImageClassifier { backbone, head }
        .load_file(weights_path(path), &CompactRecorder::new(), device)
        .map_err(|e| ClassifierError::ModelLoad(path.to_path_buf(), e.to_string()))?;

    let ImageClassifier { backbone, head } = network;
    let backbone = backbone.freeze_leading(manifest.frozen_layers);

    Ok(CompiledModel {
        network: ImageClassifier { backbone, head },
        backbone: manifest.backbone,
        compile,
    })
}

fn save_record<M: Module<B>, B: Backend>(module: M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    module
        .save_file(weights_path(path), &CompactRecorder::new())
        .map_err(|e| ClassifierError::Model(format!("Failed to save {}: {}", path.display(), e)))
}

fn load_manifest(path: &Path, expected: ArtifactKind) -> Result<ModelManifest> {
    let manifest_file = manifest_path(path);
    if !manifest_file.exists() || !weights_path(path).exists() {
        return Err(ClassifierError::ModelLoad(
            path.to_path_buf(),
            "artifact not found".to_string(),
        ));
    }
    let manifest: ModelManifest = load_json(&manifest_file)
        .map_err(|e| ClassifierError::ModelLoad(path.to_path_buf(), e.to_string()))?;

    if manifest.kind != expected {
        return Err(ClassifierError::ModelLoad(
            path.to_path_buf(),
            format!("expected a {:?} artifact, found {:?}", expected, manifest.kind),
        ));
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::backbone::Architecture;
    use crate::model::classifier::prepare_full_model;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Tensor;
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn compact_base(device: &<TestBackend as Backend>::Device) -> BaseModel<TestBackend> {
        let config = BackboneConfig::new([32, 32, 3]).with_architecture(Architecture::Compact);
        let network = config.init(device);
        BaseModel::new(config, network)
    }

    #[test]
    fn test_base_model_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prepare").join("base_model");
        let device = Default::default();

        let model = compact_base(&device);
        save_base_model(&model, &path).unwrap();
        assert!(weights_path(&path).exists());
        assert!(manifest_path(&path).exists());

        let loaded = load_base_model::<TestBackend>(&path, &device).unwrap();
        assert_eq!(loaded.config, model.config);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected: Vec<f32> = model.network.forward(input.clone()).flatten().into_data().to_vec().unwrap();
        let actual: Vec<f32> = loaded.network.forward(input).flatten().into_data().to_vec().unwrap();
        assert_eq!(expected.len(), actual.len());
        // Records are stored at half precision
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() <= 1e-2 * a.abs().max(1.0));
        }
    }

    #[test]
    fn test_compiled_model_keeps_frozen_layers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("base_model_updated");
        let device = Default::default();

        let compiled = prepare_full_model(compact_base(&device), 2, true, None, 0.01);
        save_compiled_model(&compiled, &path).unwrap();

        let loaded = load_compiled_model::<Autodiff<TestBackend>>(&path, &device).unwrap();
        assert_eq!(loaded.num_classes(), 2);
        assert_eq!(loaded.compile, compiled.compile);
        let backbone = &loaded.network.backbone;
        assert_eq!(backbone.frozen_layers(), backbone.num_layers());
        assert_eq!(backbone.layers()[0].requires_grad(), Some(false));
        assert!(loaded.network.head.weight.val().is_require_grad());
    }

    #[test]
    fn test_paths_differing_by_extension_do_not_collide() {
        let dir = tempdir().unwrap();
        let base_path = dir.path().join("model.h5");
        let compiled_path = dir.path().join("model.keras");
        let device = Default::default();

        save_base_model(&compact_base(&device), &base_path).unwrap();
        let compiled = prepare_full_model(compact_base(&device), 3, true, None, 0.01);
        save_compiled_model(&compiled, &compiled_path).unwrap();

        assert_eq!(weights_path(&base_path), dir.path().join("model.h5.mpk"));
        assert_eq!(manifest_path(&compiled_path), dir.path().join("model.keras.json"));
        assert!(load_base_model::<TestBackend>(&base_path, &device).is_ok());
        assert_eq!(
            load_compiled_model::<TestBackend>(&compiled_path, &device).unwrap().num_classes(),
            3
        );
    }

    #[test]
    fn test_missing_artifact_is_model_load_error() {
        let dir = tempdir().unwrap();
        let err = load_compiled_model::<TestBackend>(&dir.path().join("nope"), &Default::default())
            .unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_, _)));
    }

    #[test]
    fn test_kind_mismatch_is_model_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("base_model");
        let device = Default::default();
        save_base_model(&compact_base(&device), &path).unwrap();

        let err = load_compiled_model::<TestBackend>(&path, &device).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_, _)));
    }

    #[test]
    fn test_corrupt_weights_are_model_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("base_model");
        let device = Default::default();
        save_base_model(&compact_base(&device), &path).unwrap();
        fs::write(weights_path(&path), b"not a record").unwrap();

        let err = load_base_model::<TestBackend>(&path, &device).unwrap_err();
        assert!(matches!(err, ClassifierError::ModelLoad(_, _)));
    }
}
