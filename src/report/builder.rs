//! Report assembly: overlay rendering and text templating

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage, ImageFormat, Rgb, RgbImage};
use tracing::debug;

use super::{format_percentage, Assessment, ReportConfig, ReportFields, ReportPayload, UNKNOWN_STUDY_ID};
use crate::diagnosis::DiagnosisRecord;
use crate::explain::{colormap, HeatmapMap};
use crate::imaging::RawImage;
use crate::utils::error::{DiagnosisError, Result};

/// Per-request report metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ReportContext {
    pub study_id: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ReportContext {
    /// Context stamped with the current time
    pub fn now() -> Self {
        Self {
            study_id: None,
            generated_at: Utc::now(),
        }
    }

    pub fn with_study_id(mut self, study_id: impl Into<String>) -> Self {
        self.study_id = Some(study_id.into());
        self
    }

    pub fn with_generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = generated_at;
        self
    }
}

/// Builds [`ReportPayload`]s
#[derive(Debug, Clone)]
pub struct ReportDataBuilder {
    config: ReportConfig,
    model_name: String,
}

impl ReportDataBuilder {
    pub fn new(config: ReportConfig, model_name: impl Into<String>) -> Self {
        Self {
            config,
            model_name: model_name.into(),
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Build a payload stamped with the current time and no study id
    pub fn build(
        &self,
        record: &DiagnosisRecord,
        original: &RawImage,
        heatmap: &HeatmapMap,
    ) -> Result<ReportPayload> {
        self.build_with_context(record, original, heatmap, ReportContext::now())
    }

    pub fn build_with_context(
        &self,
        record: &DiagnosisRecord,
        original: &RawImage,
        heatmap: &HeatmapMap,
        context: ReportContext,
    ) -> Result<ReportPayload> {
        let overlay = self.render_overlay(original, heatmap);
        let overlay_png = encode_png(overlay)?;

        debug!(
            "Report overlay {} encoded ({} bytes)",
            heatmap.dimensions(),
            overlay_png.len()
        );

        Ok(ReportPayload {
            record: record.clone(),
            fields: self.fields(record, context),
            overlay_dimensions: heatmap.dimensions(),
            overlay_png,
        })
    }

    /// Original resized to the heatmap size, with the jet-colored heatmap blended in
    ///
    /// Without a salient region the resized original is returned untinted.
    pub fn render_overlay(&self, original: &RawImage, heatmap: &HeatmapMap) -> RgbImage {
        let mut base = original.to_rgb8();
        if base.dimensions() != (heatmap.width(), heatmap.height()) {
            base = image::imageops::resize(
                &base,
                heatmap.width(),
                heatmap.height(),
                FilterType::Triangle,
            );
        }

        if heatmap.no_salient_region() {
            return base;
        }

        let colored = colormap::colorize(heatmap);
        let alpha = self.config.blend_alpha;
        for (pixel, tint) in base.pixels_mut().zip(colored.pixels()) {
            *pixel = blend(*pixel, *tint, alpha);
        }
        base
    }

    fn fields(&self, record: &DiagnosisRecord, context: ReportContext) -> ReportFields {
        let assessment = Assessment::grade(record, self.config.detected_probability);

        ReportFields {
            title: self.config.title.clone(),
            diagnosis: record.label().to_string(),
            probability: format_percentage(record.probability()),
            confidence: record.confidence_band().description().to_string(),
            assessment: assessment.text().to_string(),
            saliency_note: saliency_note(record),
            disclaimer: self.config.disclaimer.clone(),
            model_name: self.model_name.clone(),
            study_id: context
                .study_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_STUDY_ID.to_string()),
            generated_at: context.generated_at,
        }
    }
}

fn saliency_note(record: &DiagnosisRecord) -> String {
    let summary = record.heatmap_summary();
    match summary.peak {
        Some((row, col)) if !summary.no_salient_region => format!(
            "Strongest activation at row {}, column {}; {} of the image is highlighted.",
            row,
            col,
            format_percentage(summary.coverage_fraction)
        ),
        _ => "No salient region was found; the overlay shows the unannotated image.".to_string(),
    }
}

fn blend(base: Rgb<u8>, tint: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |b: u8, t: u8| (alpha * t as f32 + (1.0 - alpha) * b as f32).round().clamp(0.0, 255.0) as u8;
    Rgb([
        mix(base[0], tint[0]),
        mix(base[1], tint[1]),
        mix(base[2], tint[2]),
    ])
}

fn encode_png(image: RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| DiagnosisError::Report(format!("failed to encode overlay: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::DiagnosisAssembler;
    use crate::imaging::ImageDimensions;
    use crate::model::DiagnosisClass;
    use chrono::TimeZone;
    use image::GrayImage;

    fn gray_original(width: u32, height: u32, level: u8) -> RawImage {
        RawImage::from_dynamic(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            width,
            height,
            image::Luma([level]),
        )))
        .unwrap()
    }

    fn salient_heatmap(size: u32) -> HeatmapMap {
        let values = (0..size * size)
            .map(|i| (i % size) as f32 / (size - 1) as f32)
            .collect();
        HeatmapMap::new(ImageDimensions::square(size), values, false)
    }

    fn fixed_context() -> ReportContext {
        ReportContext::now()
            .with_generated_at(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())
    }

    #[test]
    fn test_confident_pneumonia_report() {
        let heatmap = salient_heatmap(16);
        let record = DiagnosisAssembler::default()
            .assemble(0.927, &heatmap, 0.5)
            .unwrap();
        let builder = ReportDataBuilder::new(ReportConfig::default(), "Pneumonia Detector v1");

        let payload = builder
            .build_with_context(
                &record,
                &gray_original(64, 48, 100),
                &heatmap,
                fixed_context().with_study_id("CXR-0042"),
            )
            .unwrap();

        assert_eq!(payload.record.label(), DiagnosisClass::Pneumonia);
        assert_eq!(payload.fields.diagnosis, "Pneumonia");
        assert_eq!(payload.fields.probability, "92.7%");
        assert_eq!(payload.fields.assessment, "Pneumonia Detected");
        assert_eq!(payload.fields.study_id, "CXR-0042");
        assert_eq!(payload.fields.model_name, "Pneumonia Detector v1");
        assert!(payload.fields.disclaimer.contains("qualified radiologist"));
        assert_eq!(payload.overlay_dimensions, ImageDimensions::square(16));

        let overlay = image::load_from_memory(&payload.overlay_png).unwrap();
        assert_eq!((overlay.width(), overlay.height()), (16, 16));
    }

    #[test]
    fn test_overlay_tinted_by_heatmap() {
        let heatmap = salient_heatmap(8);
        let builder = ReportDataBuilder::new(ReportConfig::default(), "test");
        let overlay = builder.render_overlay(&gray_original(8, 8, 100), &heatmap);

        // value 1.0 -> jet (128, 0, 0); 0.4 * 128 + 0.6 * 100 = 111.2
        assert_eq!(overlay.get_pixel(7, 0), &Rgb([111, 60, 60]));
        // value 0.0 -> jet (0, 0, 128); 0.6 * 100 + 0.4 * 128 = 111.2
        assert_eq!(overlay.get_pixel(0, 0), &Rgb([60, 60, 111]));
    }

    #[test]
    fn test_no_salient_region_overlay_is_untinted() {
        let heatmap = HeatmapMap::empty(ImageDimensions::square(8));
        let record = DiagnosisAssembler::default()
            .assemble(0.2, &heatmap, 0.5)
            .unwrap();
        let builder = ReportDataBuilder::new(ReportConfig::default(), "test");
        let original = gray_original(8, 8, 77);

        let overlay = builder.render_overlay(&original, &heatmap);
        assert_eq!(overlay, original.to_rgb8());

        let payload = builder
            .build_with_context(&record, &original, &heatmap, fixed_context())
            .unwrap();
        assert!(payload.fields.saliency_note.starts_with("No salient region"));
        assert_eq!(payload.fields.study_id, "N/A");
        assert_eq!(payload.fields.assessment, "Normal");
    }

    #[test]
    fn test_build_stamps_current_time() {
        let heatmap = salient_heatmap(4);
        let record = DiagnosisAssembler::default()
            .assemble(0.3, &heatmap, 0.5)
            .unwrap();
        let before = Utc::now();

        let payload = ReportDataBuilder::new(ReportConfig::default(), "test")
            .build(&record, &gray_original(4, 4, 10), &heatmap)
            .unwrap();

        assert!(payload.fields.generated_at >= before);
        assert_eq!(payload.fields.study_id, "N/A");
        assert_eq!(payload.fields.diagnosis, "Normal");
    }

    #[test]
    fn test_payload_json_excludes_overlay() {
        let heatmap = salient_heatmap(4);
        let record = DiagnosisAssembler::default()
            .assemble(0.6, &heatmap, 0.5)
            .unwrap();
        let payload = ReportDataBuilder::new(ReportConfig::default(), "test")
            .build_with_context(&record, &gray_original(4, 4, 10), &heatmap, fixed_context())
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["record"]["label"], "Pneumonia");
        assert_eq!(json["fields"]["assessment"], "Possible Pneumonia (Moderate)");
        assert_eq!(json["fields"]["generated_at"], "2024-03-01T09:30:00Z");
        assert!(json.get("overlay_png").is_none());
    }
}
