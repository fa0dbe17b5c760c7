//! Diagnosis records
//!
//! Turns the model probability and the Grad-CAM heatmap into a
//! [`DiagnosisRecord`]: label, confidence band, and a compact summary of where
//! the saliency sits.

pub mod assembler;

pub use assembler::DiagnosisAssembler;

use serde::{Deserialize, Serialize};

use crate::model::DiagnosisClass;
use crate::utils::error::ConfigError;

/// Default decision threshold on the Pneumonia probability
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Decision and summary settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    /// Label is Pneumonia iff probability >= threshold
    pub threshold: f32,
    /// Margins |p - threshold| below this are Low confidence
    pub low_band_below: f32,
    /// Margins below this (and not Low) are Medium confidence
    pub medium_band_below: f32,
    /// Heatmap value counted as activated in the coverage fraction
    pub activation_cutoff: f32,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            low_band_below: 0.15,
            medium_band_below: 0.35,
            activation_cutoff: 0.5,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::Invalid(format!(
                "decision.threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.low_band_below > 0.0 && self.low_band_below < self.medium_band_below) {
            return Err(ConfigError::Invalid(format!(
                "decision bands must satisfy 0 < low_band_below < medium_band_below, got {} and {}",
                self.low_band_below, self.medium_band_below
            )));
        }
        if !(self.activation_cutoff > 0.0 && self.activation_cutoff <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "decision.activation_cutoff must be in (0, 1], got {}",
                self.activation_cutoff
            )));
        }
        Ok(())
    }
}

/// How far the probability sits from the decision threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceBand {
    Low,
    Medium,
    High,
}

impl ConfidenceBand {
    /// Band for a margin |p - threshold|
    pub fn from_margin(margin: f32, config: &DecisionConfig) -> Self {
        if margin < config.low_band_below {
            ConfidenceBand::Low
        } else if margin < config.medium_band_below {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::High
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConfidenceBand::Low => "Low confidence: probability is close to the decision threshold",
            ConfidenceBand::Medium => "Moderate confidence",
            ConfidenceBand::High => "High confidence: probability is far from the decision threshold",
        }
    }
}

impl std::fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceBand::Low => write!(f, "Low"),
            ConfidenceBand::Medium => write!(f, "Medium"),
            ConfidenceBand::High => write!(f, "High"),
        }
    }
}

/// Where the saliency sits in the heatmap
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatmapSummary {
    /// (row, column) of the first maximum; `None` without a salient region
    pub peak: Option<(u32, u32)>,
    pub peak_value: f32,
    /// Fraction of pixels at or above the activation cutoff
    pub coverage_fraction: f32,
    pub no_salient_region: bool,
}

/// Immutable outcome of one diagnosis
///
/// Only [`DiagnosisAssembler`] builds records, so the
/// label always agrees with the probability and threshold. Serialize-only.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiagnosisRecord {
    label: DiagnosisClass,
    probability: f32,
    threshold: f32,
    confidence_band: ConfidenceBand,
    heatmap_summary: HeatmapSummary,
}

impl DiagnosisRecord {
    pub fn label(&self) -> DiagnosisClass {
        self.label
    }

    /// Pneumonia probability
    pub fn probability(&self) -> f32 {
        self.probability
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn confidence_band(&self) -> ConfidenceBand {
        self.confidence_band
    }

    pub fn heatmap_summary(&self) -> &HeatmapSummary {
        &self.heatmap_summary
    }

    pub fn no_salient_region(&self) -> bool {
        self.heatmap_summary.no_salient_region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_config_default() {
        let config = DecisionConfig::default();
        assert_eq!(config.threshold, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_decision_config_validation() {
        let mut config = DecisionConfig::default();
        config.threshold = 1.5;
        assert!(config.validate().is_err());

        config = DecisionConfig::default();
        config.low_band_below = 0.4;
        assert!(config.validate().is_err());

        config = DecisionConfig::default();
        config.activation_cutoff = 0.0;
        assert!(config.validate().is_err());

        config = DecisionConfig::default();
        config.threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_band_boundaries() {
        let config = DecisionConfig::default();
        assert_eq!(ConfidenceBand::from_margin(0.0, &config), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::from_margin(0.149, &config), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::from_margin(0.15, &config), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_margin(0.349, &config), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_margin(0.35, &config), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::High.to_string(), "High");
    }

    #[test]
    fn test_record_serializes_assembled_fields() {
        let heatmap = crate::explain::HeatmapMap::empty(crate::imaging::ImageDimensions::square(4));
        let record = DiagnosisAssembler::default()
            .assemble(0.8, &heatmap, 0.5)
            .unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["label"], "Pneumonia");
        assert_eq!(json["threshold"], 0.5);
        assert_eq!(json["confidence_band"], "Medium");
        assert_eq!(json["heatmap_summary"]["no_salient_region"], true);
    }
}
