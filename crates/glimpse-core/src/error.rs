//! Error types for Glimpse.
//!
//! Errors are grouped by concern: configuration loading, and everything that
//! can go wrong between "caller supplies an image" and "caption comes back".
//! Each variant carries enough context (paths, model ids, engine state) to
//! produce an actionable message.

use std::path::PathBuf;
use thiserror::Error;

use crate::caption::EngineState;

/// Top-level error type for Glimpse operations.
#[derive(Error, Debug)]
pub enum GlimpseError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Captioning errors (model lifecycle, intake, inference)
    #[error("Caption error: {0}")]
    Caption(#[from] CaptionError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file does not exist
    #[error("Config file not found at {0}")]
    Missing(PathBuf),

    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The document is not valid YAML/TOML, or a required key is absent
    #[error("Failed to parse config {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised by the captioning engine and the image intake stages
/// in front of it.
#[derive(Error, Debug)]
pub enum CaptionError {
    /// One of the model artifacts could not be acquired
    #[error("Failed to load model {model}: {message}")]
    ModelLoad { model: String, message: String },

    /// An operation was called while the engine was in the wrong state
    #[error("Caption engine is not ready (state: {state})")]
    NotReady { state: EngineState },

    /// Feature extraction, generation, or decoding failed
    #[error("Caption generation failed: {message}")]
    Inference { message: String },

    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

impl CaptionError {
    /// Shorthand for an inference failure carrying the underlying cause.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// True for failures that mean the engine was used in the wrong state.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

/// Convenience type alias for Glimpse results.
pub type Result<T> = std::result::Result<T, GlimpseError>;

/// Convenience type alias for caption-specific results.
pub type CaptionResult<T> = std::result::Result<T, CaptionError>;
