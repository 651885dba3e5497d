//! Image preprocessing for the vision encoder.
//!
//! Follows the ViT image processor conventions found in a model's
//! `preprocessor_config.json`:
//! - Resize to a fixed `height × width` (bilinear unless configured otherwise)
//! - Rescale pixel values by `rescale_factor` (1/255)
//! - Normalize per channel: `(value - mean) / std`
//! - Tensor layout: NCHW `[1, 3, height, width]`

use std::borrow::Cow;
use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::Deserialize;

use crate::error::{CaptionError, CaptionResult};

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Convert an image to three-channel RGB.
///
/// Already-RGB8 images are borrowed untouched; anything else (grayscale,
/// alpha, 16-bit) is converted.
pub fn normalize_color(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image {
        DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    }
}

/// Target size as written in `preprocessor_config.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    /// `"size": {"height": 224, "width": 224}`
    HeightWidth { height: u32, width: u32 },
    /// `"size": {"shortest_edge": 224}`, treated as a square
    ShortestEdge { shortest_edge: u32 },
    /// `"size": 224`
    Square(u32),
}

impl SizeSpec {
    /// Resolved `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        match *self {
            SizeSpec::HeightWidth { height, width } => (width, height),
            SizeSpec::ShortestEdge { shortest_edge } => (shortest_edge, shortest_edge),
            SizeSpec::Square(side) => (side, side),
        }
    }
}

/// Converts raw pixels into the fixed-size tensor the encoder expects.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureExtractor {
    do_resize: bool,
    size: SizeSpec,
    /// PIL resampling code (0 nearest, 1 lanczos, 2 bilinear, 3 bicubic)
    resample: u8,
    do_rescale: bool,
    rescale_factor: f32,
    do_normalize: bool,
    image_mean: Vec<f32>,
    image_std: Vec<f32>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: SizeSpec::HeightWidth {
                height: 224,
                width: 224,
            },
            resample: 2,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: vec![0.5; CHANNELS],
            image_std: vec![0.5; CHANNELS],
        }
    }
}

impl FeatureExtractor {
    /// Load from a `preprocessor_config.json` file.
    pub fn from_file(path: &Path, model: &str) -> CaptionResult<Self> {
        let load_error = |message: String| CaptionError::ModelLoad {
            model: model.to_string(),
            message,
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| load_error(format!("Failed to read {}: {e}", path.display())))?;
        let extractor: Self = serde_json::from_str(&content)
            .map_err(|e| load_error(format!("Invalid {}: {e}", path.display())))?;
        extractor.check().map_err(load_error)?;
        Ok(extractor)
    }

    fn check(&self) -> Result<(), String> {
        let (width, height) = self.size.dimensions();
        if width == 0 || height == 0 {
            return Err("preprocessor size must be non-zero".into());
        }
        for (name, values) in [("image_mean", &self.image_mean), ("image_std", &self.image_std)] {
            if values.len() != 1 && values.len() != CHANNELS {
                return Err(format!("{name} must have 1 or 3 entries"));
            }
        }
        if self.image_std.iter().any(|&s| s == 0.0) {
            return Err("image_std must not contain zero".into());
        }
        Ok(())
    }

    /// Output tensor size as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.size.dimensions()
    }

    /// Preprocess an RGB image into an NCHW tensor.
    ///
    /// Non-RGB input is converted first, so callers may pass any color type.
    pub fn extract(&self, image: &DynamicImage) -> Array4<f32> {
        let (width, height) = self.size.dimensions();
        let resized = if self.do_resize && (image.width(), image.height()) != (width, height) {
            Cow::Owned(image.resize_exact(width, height, self.filter()))
        } else {
            Cow::Borrowed(image)
        };
        let rgb = resized.to_rgb8();

        let (w, h) = (rgb.width() as usize, rgb.height() as usize);
        let mut tensor = Array4::<f32>::zeros((1, CHANNELS, h, w));

        for (x, y, pixel) in rgb.enumerate_pixels() {
            for (c, &val) in pixel.0.iter().enumerate() {
                let mut v = val as f32;
                if self.do_rescale {
                    v *= self.rescale_factor;
                }
                if self.do_normalize {
                    v = (v - channel(&self.image_mean, c)) / channel(&self.image_std, c);
                }
                tensor[[0, c, y as usize, x as usize]] = v;
            }
        }

        tensor
    }

    fn filter(&self) -> FilterType {
        match self.resample {
            0 => FilterType::Nearest,
            1 => FilterType::Lanczos3,
            3 => FilterType::CatmullRom,
            _ => FilterType::Triangle,
        }
    }
}

fn channel(values: &[f32], c: usize) -> f32 {
    values[c.min(values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_normalize_color_is_noop_for_rgb() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])));
        let normalized = normalize_color(&img);
        assert!(matches!(normalized, Cow::Borrowed(_)));
        assert_eq!(normalized.as_bytes(), img.as_bytes());
    }

    #[test]
    fn test_normalize_color_converts_gray_and_alpha() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([100])));
        let normalized = normalize_color(&gray);
        assert!(matches!(normalized.as_ref(), DynamicImage::ImageRgb8(_)));
        assert_eq!(normalized.to_rgb8().get_pixel(0, 0), &Rgb([100, 100, 100]));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])));
        let normalized = normalize_color(&rgba);
        assert!(matches!(normalized.as_ref(), DynamicImage::ImageRgb8(_)));
        assert_eq!(normalized.to_rgb8().get_pixel(1, 1), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_extract_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let tensor = FeatureExtractor::default().extract(&img);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_extract_normalization_range() {
        let extractor = FeatureExtractor::default();

        // White: (255/255 - 0.5) / 0.5 = 1.0
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 255, 255])));
        let tensor = extractor.extract(&img);
        assert!(tensor.iter().all(|v| (v - 1.0).abs() < 1e-4));

        // Black: (0 - 0.5) / 0.5 = -1.0
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let tensor = extractor.extract(&img);
        assert!(tensor.iter().all(|v| (v + 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_extract_channel_order() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(224, 224, Rgb([255, 0, 255])));
        let tensor = FeatureExtractor::default().extract(&img);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-4);
        assert!((tensor[[0, 1, 5, 5]] + 1.0).abs() < 1e-4);
        assert!((tensor[[0, 2, 5, 5]] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_from_file_reads_vit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessor_config.json");
        std::fs::write(
            &path,
            r#"{
                "do_normalize": true,
                "do_resize": true,
                "feature_extractor_type": "ViTFeatureExtractor",
                "image_mean": [0.5, 0.5, 0.5],
                "image_std": [0.5, 0.5, 0.5],
                "resample": 2,
                "size": {"height": 32, "width": 48}
            }"#,
        )
        .unwrap();

        let extractor = FeatureExtractor::from_file(&path, "test").unwrap();
        assert_eq!(extractor.dimensions(), (48, 32));
        let tensor = extractor.extract(&DynamicImage::new_rgb8(100, 100));
        assert_eq!(tensor.shape(), &[1, 3, 32, 48]);
    }

    #[test]
    fn test_size_spec_variants() {
        let square: SizeSpec = serde_json::from_str("384").unwrap();
        assert_eq!(square.dimensions(), (384, 384));
        let edge: SizeSpec = serde_json::from_str(r#"{"shortest_edge": 256}"#).unwrap();
        assert_eq!(edge.dimensions(), (256, 256));
    }

    #[test]
    fn test_from_file_rejects_bad_std() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessor_config.json");
        std::fs::write(&path, r#"{"image_std": [0.5, 0.0, 0.5]}"#).unwrap();
        let err = FeatureExtractor::from_file(&path, "test").unwrap_err();
        assert!(matches!(err, CaptionError::ModelLoad { .. }));
    }

    #[test]
    fn test_from_file_missing_is_load_error() {
        let err = FeatureExtractor::from_file(Path::new("/nonexistent/pp.json"), "m").unwrap_err();
        assert!(err.to_string().contains("m"));
    }
}
