//! Glimpse Core - image captioning with pretrained vision-encoder-decoder models.
//!
//! Glimpse loads a captioning model once and turns images into short English
//! captions. The library has no UI; the `glimpse` binary is one adapter over
//! it.
//!
//! # Architecture
//!
//! ```text
//! Config ──▶ CaptionEngine::load() ──▶ Ready
//!
//! Image → Validate → Decode → Preprocess → Encode → Beam search → Detokenize → Caption
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use glimpse_core::{Captioner, Config};
//!
//! #[tokio::main]
//! async fn main() -> glimpse_core::Result<()> {
//!     let config = Config::load()?;
//!     let captioner = Captioner::from_config(&config).await?;
//!
//!     let record = captioner.caption_file("./dog.jpg".as_ref()).await?;
//!     println!("{}", record.caption);
//!     Ok(())
//! }
//! ```

pub mod caption;
pub mod config;
pub mod error;
pub mod intake;
pub mod output;
pub mod service;
pub mod types;

pub use caption::{CaptionEngine, Device, EngineState};
pub use config::Config;
pub use error::{CaptionError, CaptionResult, ConfigError, GlimpseError, Result};
pub use intake::FileDiscovery;
pub use output::{OutputFormat, OutputWriter};
pub use service::Captioner;
pub use types::{CaptionRecord, CaptionStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
