//! Streaming JSON / JSON Lines output.
//!
//! Records are written as they are produced, so a long batch never has to be
//! held in memory. JSON output is a single array that is closed by
//! [`OutputWriter::finish`].

use serde::Serialize;
use std::io::Write;

use crate::error::Result;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// A JSON array of records
    Json,
    /// One JSON object per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Serializes records one at a time.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    written: usize,
}

impl<W: Write> OutputWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            written: 0,
        }
    }

    /// Append one record.
    ///
    /// Serialization failures surface as [`GlimpseError::Json`], sink
    /// failures as [`GlimpseError::Io`].
    ///
    /// [`GlimpseError::Json`]: crate::GlimpseError::Json
    /// [`GlimpseError::Io`]: crate::GlimpseError::Io
    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<()> {
        if self.format == OutputFormat::Json {
            let sep: &[u8] = if self.written == 0 { b"[\n  " } else { b",\n  " };
            self.writer.write_all(sep)?;
        }
        serde_json::to_writer(&mut self.writer, item)?;
        if self.format == OutputFormat::JsonLines {
            self.writer.write_all(b"\n")?;
        }
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Close the JSON array (an empty batch yields `[]`), flush, and return
    /// the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        if self.format == OutputFormat::Json {
            let tail: &[u8] = if self.written == 0 { b"[]\n" } else { b"\n]\n" };
            self.writer.write_all(tail)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}
