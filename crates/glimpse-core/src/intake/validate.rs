//! Cheap checks run on a file before it is decoded.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::{CaptionError, CaptionResult};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Rejects files that are missing, oversized, or not images.
#[derive(Debug, Clone)]
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Check existence, size limit and image signature.
    ///
    /// Returns the sniffed container name (`"jpeg"`, `"png"`, ...).
    pub fn validate(&self, path: &Path) -> CaptionResult<&'static str> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(CaptionError::FileNotFound(path.to_path_buf())),
        };

        let max_bytes = self.limits.max_file_size_mb * BYTES_PER_MB;
        if metadata.len() > max_bytes {
            return Err(CaptionError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / BYTES_PER_MB,
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let mut header = [0u8; 12];
        let read = std::fs::File::open(path)
            .and_then(|mut f| read_header(&mut f, &mut header))
            .map_err(|e| CaptionError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot read file: {e}"),
            })?;

        sniff(&header[..read]).ok_or_else(|| CaptionError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
        })
    }
}

/// Fill as much of `buf` as the file allows.
fn read_header(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Identify an image container from its leading bytes.
pub fn sniff(header: &[u8]) -> Option<&'static str> {
    match header {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("png"),
        [b'G', b'I', b'F', b'8', ..] => Some("gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        [b'B', b'M', ..] => Some("bmp"),
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some("tiff"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_known_signatures() {
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpeg"));
        assert_eq!(sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]), Some("png"));
        assert_eq!(sniff(b"GIF89a"), Some("gif"));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBP"), Some("webp"));
        assert_eq!(sniff(b"BM\0\0"), Some("bmp"));
        assert_eq!(sniff(&[b'I', b'I', 0x2A, 0x00]), Some("tiff"));
        assert_eq!(sniff(&[b'M', b'M', 0x00, 0x2A]), Some("tiff"));
    }

    #[test]
    fn test_sniff_rejects_lookalikes() {
        assert_eq!(sniff(b"RIFF\0\0\0\0WAVE"), None);
        assert_eq!(sniff(&[b'I', b'I', 0x00, 0x00]), None);
        assert_eq!(sniff(b"hello world"), None);
        assert_eq!(sniff(&[]), None);
    }

    #[test]
    fn test_missing_file() {
        let validator = Validator::new(LimitsConfig::default());
        let err = validator.validate(Path::new("/nonexistent/cat.jpg")).unwrap_err();
        assert!(matches!(err, CaptionError::FileNotFound(_)));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let validator = Validator::new(LimitsConfig::default());
        let err = validator.validate(dir.path()).unwrap_err();
        assert!(matches!(err, CaptionError::FileNotFound(_)));
    }

    #[test]
    fn test_text_file_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not an image").unwrap();

        let validator = Validator::new(LimitsConfig::default());
        let err = validator.validate(&path).unwrap_err();
        assert!(matches!(err, CaptionError::UnsupportedFormat { ref format, .. } if format == "txt"));
    }

    #[test]
    fn test_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        let mut bytes = vec![0x89, b'P', b'N', b'G'];
        bytes.resize(2 * BYTES_PER_MB as usize, 0);
        std::fs::write(&path, bytes).unwrap();

        let limits = LimitsConfig {
            max_file_size_mb: 1,
            ..LimitsConfig::default()
        };
        let err = Validator::new(limits).validate(&path).unwrap_err();
        assert!(matches!(err, CaptionError::FileTooLarge { size_mb: 2, max_mb: 1, .. }));
    }

    #[test]
    fn test_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        image::RgbImage::new(2, 2).save(&path).unwrap();

        let validator = Validator::new(LimitsConfig::default());
        assert_eq!(validator.validate(&path).unwrap(), "png");
    }
}
