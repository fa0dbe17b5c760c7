//! Image preprocessing for model input.
//!
//! Resizes (stretching, no aspect-ratio preservation) and normalizes an image
//! into the CHW float layout the classifier consumes. The statistics and the
//! interpolation filter must match the regime the frozen model was trained
//! with, so they live in one overridable [`PreprocessConfig`].

use image::{imageops::FilterType, RgbImage};
use serde::{Deserialize, Serialize};

use super::{ImageDimensions, RawImage};
use crate::utils::error::{ConfigError, InputError};

/// Number of channels the classifier consumes
pub const INPUT_CHANNELS: usize = 3;

/// Resampling filter used when resizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn filter_type(&self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration for image preprocessing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Per-channel means [R, G, B], applied after scaling to [0, 1]
    pub mean: [f32; 3],
    /// Per-channel standard deviations [R, G, B]
    pub std: [f32; 3],
    /// Resize filter
    pub interpolation: Interpolation,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        // Plain division by 255, as the deployed model was trained
        Self {
            mean: [0.0; 3],
            std: [1.0; 3],
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl PreprocessConfig {
    /// ImageNet statistics, for backbones fine-tuned with them
    pub fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            interpolation: Interpolation::Bilinear,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (c, (&mean, &std)) in self.mean.iter().zip(self.std.iter()).enumerate() {
            if !mean.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "preprocess.mean[{}] must be finite",
                    c
                )));
            }
            if !std.is_finite() || std <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "preprocess.std[{}] must be positive, got {}",
                    c, std
                )));
            }
        }
        Ok(())
    }

    /// Inclusive bounds of the normalized values for channel `c`
    pub fn value_range(&self, c: usize) -> (f32, f32) {
        (
            (0.0 - self.mean[c]) / self.std[c],
            (1.0 - self.mean[c]) / self.std[c],
        )
    }
}

/// Normalized model input in CHW layout
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor {
    channels: usize,
    height: usize,
    width: usize,
    values: Vec<f32>,
}

impl PreprocessedTensor {
    /// Wrap a CHW buffer, checking its length against the shape
    pub fn new(
        channels: usize,
        height: usize,
        width: usize,
        values: Vec<f32>,
    ) -> Result<Self, InputError> {
        if values.len() != channels * height * width {
            return Err(InputError::DimensionMismatch(format!(
                "tensor of shape [{}, {}, {}] needs {} values, got {}",
                channels,
                height,
                width,
                channels * height * width,
                values.len()
            )));
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

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dimensions(&self) -> ImageDimensions {
        ImageDimensions::new(self.width as u32, self.height as u32)
    }
}

/// Image preprocessor for chest X-rays
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
    target: ImageDimensions,
}

impl ImagePreprocessor {
    /// Create a preprocessor producing tensors of the model's input size
    pub fn new(config: PreprocessConfig, target: ImageDimensions) -> Self {
        Self { config, target }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn target(&self) -> ImageDimensions {
        self.target
    }

    /// Expected output shape [C, H, W]
    pub fn output_shape(&self) -> [usize; 3] {
        [
            INPUT_CHANNELS,
            self.target.height as usize,
            self.target.width as usize,
        ]
    }

    /// Preprocess an image for model input
    pub fn preprocess(&self, image: &RawImage) -> Result<PreprocessedTensor, InputError> {
        let resized = self.resize(image);
        let values = self.normalize(&resized);
        PreprocessedTensor::new(
            INPUT_CHANNELS,
            self.target.height as usize,
            self.target.width as usize,
            values,
        )
    }

    /// Stretch to the target size
    pub fn resize(&self, image: &RawImage) -> RgbImage {
        let rgb = image.to_rgb8();
        if rgb.dimensions() == (self.target.width, self.target.height) {
            return rgb;
        }
        image::imageops::resize(
            &rgb,
            self.target.width,
            self.target.height,
            self.config.interpolation.filter_type(),
        )
    }

    /// Scale to [0, 1] then standardize, CHW layout
    fn normalize(&self, image: &RgbImage) -> Vec<f32> {
        let num_pixels = (image.width() * image.height()) as usize;
        let mut normalized = vec![0.0f32; INPUT_CHANNELS * num_pixels];

        for (i, pixel) in image.pixels().enumerate() {
            for c in 0..INPUT_CHANNELS {
                let value = pixel[c] as f32 / 255.0;
                normalized[c * num_pixels + i] = (value - self.config.mean[c]) / self.config.std[c];
            }
        }

        normalized
    }
}
