//! Model definitions
//!
//! - `backbone`: VGG-style feature extractor with positional freezing
//! - `classifier`: dense softmax head and `prepare_full_model`
//! - `artifact`: saving and loading models with their manifests
//! - `pretrained`: torchvision VGG weights mapped onto the backbone

pub mod artifact;
pub mod backbone;
pub mod classifier;
pub mod pretrained;

pub use artifact::{
    load_base_model, load_compiled_model, save_base_model, save_compiled_model, ModelManifest,
};
pub use backbone::{Architecture, Backbone, BackboneConfig, WeightFormat, WeightSource};
pub use classifier::{
    prepare_full_model, Activation, BaseModel, CompileSpec, CompiledModel, ImageClassifier,
};
