//! Filesystem and document helpers shared by the stages.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::utils::error::{ClassifierError, Result};

/// Read a YAML document into `T`.
///
/// Both read and parse failures are configuration errors; empty documents are rejected.
pub fn read_yaml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|e| {
        ClassifierError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    if content.trim().is_empty() {
        return Err(ClassifierError::Config(format!(
            "YAML file is empty: {}",
            path.display()
        )));
    }

    let value = serde_yaml::from_str(&content).map_err(|e| {
        ClassifierError::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    info!("yaml file: {} loaded successfully", path.display());
    Ok(value)
}

/// Create each directory (and its parents) if it does not exist yet.
pub fn create_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            continue;
        }
        fs::create_dir_all(path)?;
        debug!("created directory at: {}", path.display());
    }
    Ok(())
}

/// Serialize `value` as pretty JSON, replacing whatever was at `path`.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    info!("json file saved at: {}", path.display());
    Ok(())
}

/// Load a JSON document written by [`save_json`].
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)?;
    let value = serde_json::from_str(&json)?;
    debug!("json file loaded from: {}", path.display());
    Ok(value)
}

/// Human readable size of the file at `path`, rounded to whole kilobytes.
pub fn get_size(path: &Path) -> Result<String> {
    let bytes = fs::metadata(path)?.len();
    Ok(format!("~ {} KB", (bytes as f64 / 1024.0).round() as u64))
}

/// Append `.extension` to the file name of `path`, keeping any extension it already has.
pub fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}
