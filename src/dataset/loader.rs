//! Directory-of-classes image loader
//!
//! Expects one subdirectory per class:
//! ```text
//! root_dir/
//! ├── Cat/
//! │   ├── 0.jpg
//! │   └── 1.jpg
//! └── Dog/
//!     └── ...
//! ```
//! Labels are assigned from the sorted class directory names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{ClassifierError, Result};

/// File extensions recognised as images, compared case-insensitively
pub const IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

/// Which side of the validation split to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Training,
    Validation,
}

/// Image files grouped by class, in sorted order
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    class_names: Vec<String>,
    files_by_class: Vec<Vec<PathBuf>>,
}

impl ImageFolder {
    /// Scan `root_dir` for class subdirectories and their image files
    pub fn scan<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        if !root_dir.is_dir() {
            return Err(ClassifierError::Dataset(format!(
                "Dataset directory does not exist: {}",
                root_dir.display()
            )));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        let mut files_by_class = Vec::with_capacity(class_names.len());
        for class_name in &class_names {
            let files: Vec<PathBuf> = WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
                .map(|e| e.into_path())
                .collect();
            debug!("Class '{}': {} images", class_name, files.len());
            files_by_class.push(files);
        }

        let folder = Self {
            root_dir,
            class_names,
            files_by_class,
        };
        info!(
            "Found {} images belonging to {} classes in {}",
            folder.len(),
            folder.num_classes(),
            folder.root_dir.display()
        );
        if folder.is_empty() {
            warn!("No images found under {}", folder.root_dir.display());
        }
        Ok(folder)
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn len(&self) -> usize {
        self.files_by_class.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples of one side of a per-class split
    ///
    /// For a class with `n` files, the first `floor(n * validation_split)` files
    /// are validation and the remainder are training.
    pub fn subset(&self, subset: Subset, validation_split: f64) -> Vec<ImageSample> {
        let mut samples = Vec::new();
        for (label, files) in self.files_by_class.iter().enumerate() {
            let boundary = ((files.len() as f64) * validation_split).floor() as usize;
            let boundary = boundary.min(files.len());
            let range = match subset {
                Subset::Validation => &files[..boundary],
                Subset::Training => &files[boundary..],
            };
            samples.extend(range.iter().map(|path| ImageSample {
                path: path.clone(),
                label,
            }));
        }
        samples
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_FORMATS.contains(&ext.as_str()))
        .unwrap_or(false)
}
