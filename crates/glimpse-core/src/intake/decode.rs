//! Image decoding off the async runtime, bounded by a timeout.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, ImageReader};
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::{CaptionError, CaptionResult};

/// Decodes image bytes on the blocking pool.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// A decoded image and what was learned while decoding it.
#[derive(Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read and decode a file.
    pub async fn decode(&self, path: &Path) -> CaptionResult<DecodedImage> {
        let bytes = tokio::fs::read(path).await.map_err(|e| CaptionError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read file: {e}"),
        })?;
        self.decode_from_bytes(bytes, path).await
    }

    /// Decode an in-memory buffer. `path` is used for format fallback and
    /// error context only.
    pub async fn decode_from_bytes(
        &self,
        bytes: Vec<u8>,
        path: &Path,
    ) -> CaptionResult<DecodedImage> {
        let owned = path.to_path_buf();
        let budget = Duration::from_millis(self.limits.decode_timeout_ms);

        let decoded = match timeout(
            budget,
            tokio::task::spawn_blocking(move || decode_sync(bytes, &owned)),
        )
        .await
        {
            Ok(Ok(Ok(decoded))) => decoded,
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(join)) => {
                return Err(CaptionError::Decode {
                    path: path.to_path_buf(),
                    message: format!("Decoder task failed: {join}"),
                })
            }
            Err(_) => {
                return Err(CaptionError::Timeout {
                    path: path.to_path_buf(),
                    stage: "decode".to_string(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };

        self.check_dimensions(&decoded, path)?;
        Ok(decoded)
    }

    fn check_dimensions(&self, decoded: &DecodedImage, path: &Path) -> CaptionResult<()> {
        let max_dim = self.limits.max_image_dimension;
        if decoded.width > max_dim || decoded.height > max_dim {
            return Err(CaptionError::ImageTooLarge {
                path: path.to_path_buf(),
                width: decoded.width,
                height: decoded.height,
                max_dim,
            });
        }
        Ok(())
    }
}

fn decode_sync(bytes: Vec<u8>, path: &Path) -> CaptionResult<DecodedImage> {
    let decode_error = |message: String| CaptionError::Decode {
        path: path.to_path_buf(),
        message,
    };

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_error(format!("Cannot detect image format: {e}")))?;

    let format = match reader.format() {
        Some(format) => format,
        None => ImageFormat::from_path(path).map_err(|_| CaptionError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
        })?,
    };

    let image = reader.decode().map_err(|e| decode_error(e.to_string()))?;
    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        image,
        format,
    })
}

/// Lowercase name for an image format, as reported in caption records.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        _ => "other",
    }
}
