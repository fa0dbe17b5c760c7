//! Error Handling Module
//!
//! Defines the error taxonomy for the screening pipeline.
//! Uses thiserror for ergonomic error definitions.
//!
//! - [`InputError`]: the caller handed us an image we cannot use
//! - [`ModelError`]: the classifier is unusable or was fed the wrong shape
//! - [`ConfigError`]: configuration could not be read or failed validation
//!
//! A missing salient region is *not* an error; it travels as a flag on the
//! heatmap and the diagnosis record.

use std::path::PathBuf;

use thiserror::Error;

/// Bad or unsupported input image
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Bytes could not be decoded as a supported image encoding
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),

    /// Decoded image has zero extent or an unsupported channel layout
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Classifier failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Weights missing, corrupt, or inconsistent with the declared metadata
    #[error("Failed to load model: {0}")]
    ModelLoadFailure(String),

    /// A tensor did not have the shape the model declares
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The numeric backend failed mid-computation
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value is outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main error type for the screening pipeline
#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A numeric argument was non-finite or out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Overlay encoding failed
    #[error("Report error: {0}")]
    Report(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for InputError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(e) => InputError::DimensionMismatch(e.to_string()),
            other => InputError::InvalidImageFormat(other.to_string()),
        }
    }
}

/// Convenience Result type for pipeline operations
pub type Result<T> = std::result::Result<T, DiagnosisError>;
