//! Visual explanation of a diagnosis
//!
//! Grad-CAM turns the feature-layer activations of the classifier and the
//! gradient of the Pneumonia score into a saliency heatmap at input
//! resolution. The colormap renders such a heatmap for overlays.

pub mod colormap;
pub mod grad_cam;

pub use grad_cam::GradCamEngine;

use serde::{Deserialize, Serialize};

use crate::imaging::ImageDimensions;

/// Saliency heatmap, row-major, values in [0, 1]
///
/// When the weighted activation map had no positive value the heatmap is all
/// zero and `no_salient_region` is set. That is a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapMap {
    dimensions: ImageDimensions,
    values: Vec<f32>,
    no_salient_region: bool,
}

impl HeatmapMap {
    pub(crate) fn new(dimensions: ImageDimensions, values: Vec<f32>, no_salient_region: bool) -> Self {
        debug_assert_eq!(values.len(), dimensions.num_pixels());
        Self {
            dimensions,
            values,
            no_salient_region,
        }
    }

    /// All-zero heatmap flagged as having no salient region
    pub fn empty(dimensions: ImageDimensions) -> Self {
        Self::new(dimensions, vec![0.0; dimensions.num_pixels()], true)
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at (row, col), if inside the map
    pub fn get(&self, row: u32, col: u32) -> Option<f32> {
        if row >= self.dimensions.height || col >= self.dimensions.width {
            return None;
        }
        self.values
            .get(row as usize * self.dimensions.width as usize + col as usize)
            .copied()
    }

    pub fn no_salient_region(&self) -> bool {
        self.no_salient_region
    }
}
