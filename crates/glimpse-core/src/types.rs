//! Records produced by captioning.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One captioned image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// Path the image was read from
    pub file_path: PathBuf,

    /// Just the filename portion
    pub file_name: String,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Detected format ("jpeg", "png", ...)
    pub format: String,

    /// Generated caption, trimmed and non-empty
    pub caption: String,

    /// Model that produced the caption
    pub model: String,

    /// Wall time from intake to caption
    pub elapsed_ms: u64,
}

/// Running totals for a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionStats {
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl CaptionStats {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Images captioned per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.succeeded as f64 / secs
        } else {
            0.0
        }
    }
}
