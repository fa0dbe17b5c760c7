//! Model module: the frozen classifier and its capability interface
//!
//! This module provides:
//! - [`DiagnosticModel`], the black-box contract the pipeline relies on
//!   (`forward` and `gradient_of_class_score`)
//! - A Burn CNN backbone ([`cnn::ChestXrayClassifier`]) and the host that
//!   runs it in evaluation mode ([`host::ModelHost`])
//! - Model configuration and metadata
//!
//! The Grad-CAM engine only ever sees plain [`FeatureMap`]s, so any backbone
//! that can expose a feature layer and its gradient plugs in.

pub mod cnn;
pub mod config;
pub mod host;

pub use cnn::{ChestXrayClassifier, ChestXrayClassifierConfig};
pub use config::ModelConfig;
pub use host::ModelHost;

use serde::{Deserialize, Serialize};

use crate::imaging::{ImageDimensions, PreprocessedTensor};
use crate::utils::error::ModelError;

/// Number of output classes: {Normal, Pneumonia}
pub const NUM_CLASSES: usize = 2;

/// Binary diagnosis classes, in logit order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DiagnosisClass {
    Normal,
    Pneumonia,
}

impl DiagnosisClass {
    /// Index of this class in the classifier output
    pub fn index(&self) -> usize {
        match self {
            DiagnosisClass::Normal => 0,
            DiagnosisClass::Pneumonia => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(DiagnosisClass::Normal),
            1 => Some(DiagnosisClass::Pneumonia),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiagnosisClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosisClass::Normal => write!(f, "Normal"),
            DiagnosisClass::Pneumonia => write!(f, "Pneumonia"),
        }
    }
}

/// Static description of a loaded classifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    /// Human-readable model identifier, used in reports
    pub name: String,
    /// Input channel count
    pub input_channels: usize,
    /// Input spatial size
    pub input_size: ImageDimensions,
    /// Number of output classes
    pub num_classes: usize,
    /// Layer whose activations feed Grad-CAM
    pub feature_layer: String,
}

impl ModelMetadata {
    /// Declared input shape as [C, H, W]
    pub fn input_shape(&self) -> [usize; 3] {
        [
            self.input_channels,
            self.input_size.height as usize,
            self.input_size.width as usize,
        ]
    }

    /// Reject tensors whose shape differs from the declared input shape
    pub fn check_input(&self, tensor: &PreprocessedTensor) -> Result<(), ModelError> {
        if tensor.shape() != self.input_shape() {
            return Err(ModelError::ShapeMismatch {
                expected: self.input_shape().to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// Activations (or their gradients) of one feature layer, CHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    channels: usize,
    height: usize,
    width: usize,
    values: Vec<f32>,
}

impl FeatureMap {
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        values: Vec<f32>,
    ) -> Result<Self, ModelError> {
        if values.len() != channels * height * width {
            return Err(ModelError::ShapeMismatch {
                expected: vec![channels * height * width],
                actual: vec![values.len()],
            });
        }
        Ok(Self {
            channels,
            height,
            width,
            values,
        })
    }

    /// Shape as [channels, height, width]
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Spatial plane of channel `c`, row-major
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.values[c * plane..(c + 1) * plane]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Result of a forward pass
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// Softmax probability of the Pneumonia class
    pub probability: f32,
    /// Activations of the designated feature layer
    pub activations: FeatureMap,
}

/// Feature-layer activations plus the gradient of a class logit w.r.t. them
#[derive(Debug, Clone)]
pub struct ClassScoreGradient {
    pub class: DiagnosisClass,
    pub activations: FeatureMap,
    pub gradients: FeatureMap,
}

/// Capability contract for a frozen binary classifier
///
/// Implementations must be deterministic: the same tensor always yields the
/// same probability, activations and gradients.
pub trait DiagnosticModel: Send + Sync {
    fn metadata(&self) -> &ModelMetadata;

    /// Pneumonia probability and feature-layer activations
    fn forward(&self, tensor: &PreprocessedTensor) -> Result<ForwardOutput, ModelError>;

    /// Gradient of the pre-softmax score of `class` w.r.t. the feature layer
    fn gradient_of_class_score(
        &self,
        tensor: &PreprocessedTensor,
        class: DiagnosisClass,
    ) -> Result<ClassScoreGradient, ModelError>;
}
