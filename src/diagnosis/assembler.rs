//! Diagnosis assembly
//!
//! Pure function of (probability, heatmap, threshold). The same inputs always
//! give the same record.

use tracing::debug;

use super::{ConfidenceBand, DecisionConfig, DiagnosisRecord, HeatmapSummary};
use crate::explain::HeatmapMap;
use crate::model::DiagnosisClass;
use crate::utils::error::{DiagnosisError, Result};

/// Builds [`DiagnosisRecord`]s from model outputs
#[derive(Debug, Clone, Default)]
pub struct DiagnosisAssembler {
    config: DecisionConfig,
}

impl DiagnosisAssembler {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Label, confidence band and heatmap summary for one prediction
    pub fn assemble(
        &self,
        probability: f32,
        heatmap: &HeatmapMap,
        threshold: f32,
    ) -> Result<DiagnosisRecord> {
        check_unit("probability", probability)?;
        check_unit("threshold", threshold)?;

        let label = if probability >= threshold {
            DiagnosisClass::Pneumonia
        } else {
            DiagnosisClass::Normal
        };
        let confidence_band =
            ConfidenceBand::from_margin((probability - threshold).abs(), &self.config);
        let heatmap_summary = self.summarize(heatmap);

        debug!(
            "Assembled diagnosis: {} (p={:.4}, threshold={:.2}, band={})",
            label, probability, threshold, confidence_band
        );

        Ok(DiagnosisRecord {
            label,
            probability,
            threshold,
            confidence_band,
            heatmap_summary,
        })
    }

    /// Peak location and coverage of a heatmap
    pub fn summarize(&self, heatmap: &HeatmapMap) -> HeatmapSummary {
        let values = heatmap.values();
        if heatmap.no_salient_region() || values.is_empty() {
            return HeatmapSummary {
                peak: None,
                peak_value: 0.0,
                coverage_fraction: 0.0,
                no_salient_region: true,
            };
        }

        // First maximum in row-major order
        let (peak_index, peak_value) = values
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        let width = heatmap.width() as usize;
        let peak = ((peak_index / width) as u32, (peak_index % width) as u32);

        let activated = values
            .iter()
            .filter(|&&v| v >= self.config.activation_cutoff)
            .count();

        HeatmapSummary {
            peak: Some(peak),
            peak_value,
            coverage_fraction: activated as f32 / values.len() as f32,
            no_salient_region: false,
        }
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DiagnosisError::InvalidArgument(format!(
            "{} must be a finite value in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}
