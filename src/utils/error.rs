//! Error Handling Module
//!
//! Defines the error type shared by every pipeline stage.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Missing or invalid required configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or missing download URL
    #[error("Invalid source URL '{0}': expected an http:// or https:// address")]
    InvalidSource(String),

    /// Corrupt or unreadable archive
    #[error("Archive error: {0}")]
    Archive(String),

    /// Missing or corrupt model artifact
    #[error("Failed to load model from '{0}': {1}")]
    ModelLoad(PathBuf, String),

    /// Error with model construction or persistence
    #[error("Model error: {0}")]
    Model(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with training
    #[error("Training error: {0}")]
    Training(String),

    /// A stage operation was called before its prerequisites ran
    #[error("Stage error: {0}")]
    Stage(String),

    /// IO error (disk and network)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

impl From<zip::result::ZipError> for ClassifierError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ClassifierError::Io(e),
            other => ClassifierError::Archive(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Map the error into a configuration error with the given context
    fn config_context(self, msg: &str) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn config_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| ClassifierError::Config(format!("{}: {}", msg, e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn config_context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ClassifierError::Config(msg.to_string()))
    }
}
