//! Image intake and normalization
//!
//! This module provides:
//! - Decoding of uploaded chest X-ray bytes into a [`RawImage`]
//! - Resizing and intensity normalization into a [`PreprocessedTensor`]
//!
//! Only JPEG and PNG uploads are accepted. Grayscale radiographs are
//! replicated to three channels, matching the RGB input the classifier was
//! trained on.

pub mod preprocess;

pub use preprocess::{ImagePreprocessor, Interpolation, PreprocessConfig, PreprocessedTensor};

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::utils::error::InputError;

/// Encodings accepted from the upload boundary
pub const SUPPORTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Jpeg, ImageFormat::Png];

/// Spatial size of an image or tensor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square dimensions
    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded input image, before any resizing
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
    format: Option<ImageFormat>,
    channels: u8,
}

impl RawImage {
    /// Decode uploaded bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, InputError> {
        if bytes.is_empty() {
            return Err(InputError::InvalidImageFormat("empty buffer".to_string()));
        }

        let format = image::guess_format(bytes)?;
        if !SUPPORTED_FORMATS.contains(&format) {
            return Err(InputError::InvalidImageFormat(format!(
                "unsupported encoding {:?} (expected JPEG or PNG)",
                format
            )));
        }

        let image = image::load_from_memory_with_format(bytes, format)?;
        Self::from_parts(image, Some(format))
    }

    /// Wrap an already decoded image
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, InputError> {
        Self::from_parts(image, None)
    }

    /// Build from an interleaved 8-bit buffer (1 = grayscale, 3 = RGB)
    pub fn from_pixels(
        width: u32,
        height: u32,
        channels: u8,
        pixels: Vec<u8>,
    ) -> Result<Self, InputError> {
        ensure_nonzero(width, height)?;

        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(InputError::DimensionMismatch(format!(
                "buffer holds {} bytes, {}x{}x{} needs {}",
                pixels.len(),
                width,
                height,
                channels,
                expected
            )));
        }

        let image = match channels {
            1 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
            other => {
                return Err(InputError::DimensionMismatch(format!(
                    "unsupported channel count {} (expected 1 or 3)",
                    other
                )))
            }
        };

        let image = image.ok_or_else(|| {
            InputError::DimensionMismatch("pixel buffer does not match dimensions".to_string())
        })?;
        Self::from_parts(image, None)
    }

    fn from_parts(image: DynamicImage, format: Option<ImageFormat>) -> Result<Self, InputError> {
        ensure_nonzero(image.width(), image.height())?;

        // Grayscale and RGB, with or without alpha
        let channels = image.color().channel_count();
        if !(1..=4).contains(&channels) {
            return Err(InputError::DimensionMismatch(format!(
                "unsupported channel count {}",
                channels
            )));
        }

        Ok(Self {
            image,
            format,
            channels,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> ImageDimensions {
        ImageDimensions::new(self.width(), self.height())
    }

    /// Channel count of the source, alpha included
    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn is_grayscale(&self) -> bool {
        !self.image.color().has_color()
    }

    /// Detected encoding, if the image came from bytes
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// RGB view with alpha dropped and gray replicated
    pub fn to_rgb8(&self) -> RgbImage {
        self.image.to_rgb8()
    }
}

fn ensure_nonzero(width: u32, height: u32) -> Result<(), InputError> {
    if width == 0 || height == 0 {
        return Err(InputError::DimensionMismatch(format!(
            "image has zero extent ({}x{})",
            width, height
        )));
    }
    Ok(())
}
