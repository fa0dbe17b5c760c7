//! Heatmap colorization

use image::{Rgb, RgbImage};

use super::HeatmapMap;

/// Jet colormap: 0 = dark blue, 0.5 = green, 1 = dark red
pub fn jet(value: f32) -> Rgb<u8> {
    let t = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };

    let channel = |offset: f32| -> u8 {
        let v = (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
        (v * 255.0).round() as u8
    };

    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Render a heatmap through the jet colormap
pub fn colorize(heatmap: &HeatmapMap) -> RgbImage {
    let width = heatmap.width();
    RgbImage::from_fn(width, heatmap.height(), |x, y| {
        let value = heatmap.values()[(y * width + x) as usize];
        jet(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageDimensions;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet(0.0), Rgb([0, 0, 128]));
        assert_eq!(jet(0.5), Rgb([128, 255, 128]));
        assert_eq!(jet(1.0), Rgb([128, 0, 0]));
    }

    #[test]
    fn test_jet_clamps_out_of_range() {
        assert_eq!(jet(-3.0), jet(0.0));
        assert_eq!(jet(7.0), jet(1.0));
        assert_eq!(jet(f32::NAN), jet(0.0));
    }

    #[test]
    fn test_colorize_dimensions() {
        let heatmap = HeatmapMap::new(
            ImageDimensions::new(3, 2),
            vec![0.0, 0.5, 1.0, 1.0, 0.5, 0.0],
            false,
        );
        let image = colorize(&heatmap);

        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 0), &jet(1.0));
        assert_eq!(image.get_pixel(0, 1), &jet(1.0));
    }
}
