//! Report payloads for an external renderer
//!
//! A [`ReportPayload`] carries the diagnosis record, a Grad-CAM overlay as PNG
//! bytes, and the templated text fields a document renderer lays out. No
//! document rendering happens here.

pub mod builder;

pub use builder::{ReportContext, ReportDataBuilder};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnosis::DiagnosisRecord;
use crate::imaging::ImageDimensions;
use crate::model::DiagnosisClass;
use crate::utils::error::{ConfigError, DiagnosisError, Result};

pub const DEFAULT_DISCLAIMER: &str = "This AI-powered system provides decision support only. \
Clinical validation by a qualified radiologist is required.";

pub const DEFAULT_TITLE: &str = "AI-Powered Chest X-Ray Screening Report";

/// Shown when no study identifier was supplied
pub const UNKNOWN_STUDY_ID: &str = "N/A";

/// Report settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
    /// Heatmap weight in the overlay; the original gets 1 - alpha
    pub blend_alpha: f32,
    /// Probability from which a positive finding reads "Pneumonia Detected"
    pub detected_probability: f32,
    pub disclaimer: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            blend_alpha: 0.4,
            detected_probability: 0.75,
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.blend_alpha) {
            return Err(ConfigError::Invalid(format!(
                "report.blend_alpha must be in [0, 1], got {}",
                self.blend_alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.detected_probability) {
            return Err(ConfigError::Invalid(format!(
                "report.detected_probability must be in [0, 1], got {}",
                self.detected_probability
            )));
        }
        Ok(())
    }
}

/// Graded reading of the probability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Assessment {
    PneumoniaDetected,
    PossiblePneumonia,
    Normal,
}

impl Assessment {
    /// Grade a record; a Normal label always reads Normal
    pub fn grade(record: &DiagnosisRecord, detected_probability: f32) -> Self {
        match record.label() {
            DiagnosisClass::Normal => Assessment::Normal,
            DiagnosisClass::Pneumonia if record.probability() >= detected_probability => {
                Assessment::PneumoniaDetected
            }
            DiagnosisClass::Pneumonia => Assessment::PossiblePneumonia,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Assessment::PneumoniaDetected => "Pneumonia Detected",
            Assessment::PossiblePneumonia => "Possible Pneumonia (Moderate)",
            Assessment::Normal => "Normal",
        }
    }
}

/// Templated text for the rendered report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportFields {
    pub title: String,
    pub diagnosis: String,
    /// Probability as a percentage with one decimal, e.g. "92.7%"
    pub probability: String,
    pub confidence: String,
    pub assessment: String,
    pub saliency_note: String,
    pub disclaimer: String,
    pub model_name: String,
    pub study_id: String,
    pub generated_at: DateTime<Utc>,
}

/// Everything an external renderer needs
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    pub record: DiagnosisRecord,
    pub fields: ReportFields,
    pub overlay_dimensions: ImageDimensions,
    #[serde(skip)]
    pub overlay_png: Vec<u8>,
}

impl ReportPayload {
    /// Pretty JSON of the record and fields (overlay excluded)
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DiagnosisError::Report(format!("failed to serialize report: {}", e)))
    }
}

/// Probability as a percentage with one decimal
pub fn format_percentage(probability: f32) -> String {
    format!("{:.1}%", probability * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::DiagnosisAssembler;
    use crate::explain::HeatmapMap;

    fn record(p: f32, threshold: f32) -> DiagnosisRecord {
        let heatmap = HeatmapMap::empty(ImageDimensions::square(2));
        DiagnosisAssembler::default()
            .assemble(p, &heatmap, threshold)
            .unwrap()
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.927), "92.7%");
        assert_eq!(format_percentage(0.0), "0.0%");
        assert_eq!(format_percentage(1.0), "100.0%");
    }

    #[test]
    fn test_assessment_grades() {
        assert_eq!(Assessment::grade(&record(0.9, 0.5), 0.75), Assessment::PneumoniaDetected);
        assert_eq!(Assessment::grade(&record(0.6, 0.5), 0.75), Assessment::PossiblePneumonia);
        assert_eq!(Assessment::grade(&record(0.3, 0.5), 0.75), Assessment::Normal);
        assert_eq!(Assessment::PossiblePneumonia.text(), "Possible Pneumonia (Moderate)");
    }

    #[test]
    fn test_assessment_follows_label() {
        // Above the detection level but under a strict threshold
        assert_eq!(Assessment::grade(&record(0.78, 0.8), 0.75), Assessment::Normal);
    }

    #[test]
    fn test_report_config_validation() {
        assert!(ReportConfig::default().validate().is_ok());

        let config = ReportConfig {
            blend_alpha: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
