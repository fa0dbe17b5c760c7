//! Model Configuration Module
//!
//! Describes the frozen model artifact: where its weights live, the backbone
//! shape they were trained with, and which layer feeds Grad-CAM.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::cnn::{block_name, ChestXrayClassifierConfig};
use super::{ModelMetadata, NUM_CLASSES};
use crate::imaging::preprocess::INPUT_CHANNELS;
use crate::imaging::ImageDimensions;
use crate::utils::error::ConfigError;

/// Default model input resolution (square)
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Configuration of the classifier artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Identifier shown in reports
    pub name: String,

    /// Burn record produced by the training service
    pub weights_path: Option<PathBuf>,

    /// Layer whose activations feed Grad-CAM ("conv1" .. "convN")
    pub feature_layer: String,

    /// Input image size (width and height)
    pub input_size: u32,

    /// Filters in the first conv block
    pub base_filters: usize,

    /// Number of conv blocks
    pub num_blocks: usize,

    /// Width of the hidden fully connected layer
    pub hidden_units: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "Pneumonia Detector v1".to_string(),
            weights_path: None,
            feature_layer: "conv4".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            base_filters: 32,
            num_blocks: 4,
            hidden_units: 256,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 {
            return Err(ConfigError::Invalid(
                "model.input_size must be greater than 0".to_string(),
            ));
        }

        if self.num_blocks == 0 || self.base_filters == 0 || self.hidden_units == 0 {
            return Err(ConfigError::Invalid(
                "model.num_blocks, base_filters and hidden_units must be greater than 0"
                    .to_string(),
            ));
        }

        if (self.input_size >> self.num_blocks) == 0 {
            return Err(ConfigError::Invalid(format!(
                "model.input_size {} is too small for {} pooling blocks",
                self.input_size, self.num_blocks
            )));
        }

        if !(0..self.num_blocks).any(|i| block_name(i) == self.feature_layer) {
            return Err(ConfigError::Invalid(format!(
                "model.feature_layer '{}' is not one of conv1..conv{}",
                self.feature_layer, self.num_blocks
            )));
        }

        Ok(())
    }

    /// Backbone hyperparameters for Burn
    pub fn architecture(&self) -> ChestXrayClassifierConfig {
        ChestXrayClassifierConfig::new()
            .with_num_classes(NUM_CLASSES)
            .with_in_channels(INPUT_CHANNELS)
            .with_base_filters(self.base_filters)
            .with_num_blocks(self.num_blocks)
            .with_hidden_units(self.hidden_units)
    }

    /// Metadata the loaded model will declare
    pub fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: self.name.clone(),
            input_channels: INPUT_CHANNELS,
            input_size: ImageDimensions::square(self.input_size),
            num_classes: NUM_CLASSES,
            feature_layer: self.feature_layer.clone(),
        }
    }
}
