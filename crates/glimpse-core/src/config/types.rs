//! Optional configuration sections. Every section has defaults, so a document
//! carrying only the three required keys is complete.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which compute device the generation model should run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use the accelerator when the runtime reports one, otherwise the CPU
    #[default]
    Auto,
    /// Always run on the CPU
    Cpu,
    /// Require the CUDA execution provider
    Cuda,
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Caption generation timeout in milliseconds
    pub generate_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            max_image_dimension: 10000,
            decode_timeout_ms: 5000,
            generate_timeout_ms: 60000,
        }
    }
}

/// Beam search tuning beyond `max_length` / `num_beams`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Exponent applied to hypothesis length when ranking finished beams.
    /// 1.0 ranks by mean log-probability per token.
    pub length_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            length_penalty: 1.0,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console log level: error, warn, info, debug, trace
    pub level: String,

    /// Console log format: "pretty" or "json"
    pub format: String,

    /// Persistent log file (debug and above), relative to the working directory
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: PathBuf::from("VQA.log"),
        }
    }
}

/// Supported input extensions for directory discovery.
pub const SUPPORTED_FORMATS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];
