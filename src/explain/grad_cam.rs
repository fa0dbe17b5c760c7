//! Grad-CAM saliency
//!
//! weights[c] = mean over (h, w) of d score / d A[c, h, w]
//! cam[h, w]  = relu(sum_c weights[c] * A[c, h, w])
//!
//! The map is divided by its global maximum and resampled to the model input
//! resolution.

use image::{imageops::FilterType, ImageBuffer, Luma};
use tracing::{debug, warn};

use super::HeatmapMap;
use crate::imaging::ImageDimensions;
use crate::model::FeatureMap;
use crate::utils::error::ModelError;

/// Stateless Grad-CAM computation
#[derive(Debug, Clone, Copy, Default)]
pub struct GradCamEngine;

impl GradCamEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute a heatmap of size `output` from activations and their gradients
    ///
    /// Fails with `ShapeMismatch` when the two maps differ in shape or the
    /// output has zero extent.
    pub fn compute_heatmap(
        &self,
        activations: &FeatureMap,
        gradients: &FeatureMap,
        output: ImageDimensions,
    ) -> Result<HeatmapMap, ModelError> {
        if activations.shape() != gradients.shape() {
            return Err(ModelError::ShapeMismatch {
                expected: activations.shape().to_vec(),
                actual: gradients.shape().to_vec(),
            });
        }
        if output.num_pixels() == 0 {
            return Err(ModelError::ShapeMismatch {
                expected: vec![activations.height(), activations.width()],
                actual: vec![output.height as usize, output.width as usize],
            });
        }

        let weights = channel_weights(gradients);
        let mut cam = weighted_sum(activations, &weights);

        // Clamp before normalizing
        for value in cam.iter_mut() {
            if !value.is_finite() || *value < 0.0 {
                *value = 0.0;
            }
        }

        let max = cam.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            warn!("Grad-CAM found no salient region; returning an empty heatmap");
            return Ok(HeatmapMap::empty(output));
        }

        for value in cam.iter_mut() {
            *value /= max;
        }
        debug!(
            "Grad-CAM map {}x{} (max {:.4e}) -> {}",
            activations.width(),
            activations.height(),
            max,
            output
        );

        let values = upsample(cam, activations.width(), activations.height(), output)?;
        Ok(HeatmapMap::new(output, values, false))
    }
}

/// Spatial mean of each gradient channel
fn channel_weights(gradients: &FeatureMap) -> Vec<f32> {
    let plane = (gradients.height() * gradients.width()).max(1) as f32;
    (0..gradients.channels())
        .map(|c| gradients.channel(c).iter().sum::<f32>() / plane)
        .collect()
}

fn weighted_sum(activations: &FeatureMap, weights: &[f32]) -> Vec<f32> {
    let mut cam = vec![0.0f32; activations.height() * activations.width()];
    for (c, &weight) in weights.iter().enumerate() {
        for (acc, &a) in cam.iter_mut().zip(activations.channel(c)) {
            *acc += weight * a;
        }
    }
    cam
}

/// Bilinear resample of a normalized map, clamped back into [0, 1]
fn upsample(
    cam: Vec<f32>,
    width: usize,
    height: usize,
    output: ImageDimensions,
) -> Result<Vec<f32>, ModelError> {
    if (width, height) == (output.width as usize, output.height as usize) {
        return Ok(cam);
    }

    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(width as u32, height as u32, cam).ok_or_else(|| {
            ModelError::Backend(format!("activation map {}x{} is inconsistent", width, height))
        })?;

    let resized = image::imageops::resize(&buffer, output.width, output.height, FilterType::Triangle);
    Ok(resized
        .into_raw()
        .into_iter()
        .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
        .collect())
}
