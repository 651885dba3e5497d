//! Async captioning service over a Ready engine.
//!
//! The engine does blocking work (ONNX Runtime sessions, beam search), so
//! every call is moved to the blocking pool and bounded by the configured
//! timeout. A timed-out task is abandoned, not cancelled: it keeps its
//! blocking thread until the model returns.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tokio::time::timeout;

use crate::caption::{CaptionEngine, EngineState};
use crate::config::{Config, LimitsConfig};
use crate::error::{CaptionError, CaptionResult};
use crate::intake::{format_name, ImageDecoder, Validator};
use crate::types::CaptionRecord;

/// Captions images with a shared, already-loaded engine.
///
/// Cheap to clone; clones share the engine.
#[derive(Debug, Clone)]
pub struct Captioner {
    engine: Arc<CaptionEngine>,
    validator: Validator,
    decoder: ImageDecoder,
    generate_timeout_ms: u64,
}

impl Captioner {
    /// Wrap a Ready engine. Any other state is rejected with `NotReady`.
    pub fn new(engine: CaptionEngine, limits: &LimitsConfig) -> CaptionResult<Self> {
        if !engine.is_ready() {
            return Err(CaptionError::NotReady {
                state: engine.state(),
            });
        }
        Ok(Self {
            engine: Arc::new(engine),
            validator: Validator::new(limits.clone()),
            decoder: ImageDecoder::new(limits.clone()),
            generate_timeout_ms: limits.generate_timeout_ms,
        })
    }

    /// Build the ONNX-backed engine for `config` and load it on the blocking
    /// pool.
    pub async fn from_config(config: &Config) -> CaptionResult<Self> {
        let owned = config.clone();
        let model = config.model_name.clone();
        let engine = tokio::task::spawn_blocking(move || {
            let mut engine = CaptionEngine::new(&owned);
            engine.load().map(|()| engine)
        })
        .await
        .map_err(|e| CaptionError::ModelLoad {
            model,
            message: format!("Loader task failed: {e}"),
        })??;
        Self::new(engine, &config.limits)
    }

    pub fn engine(&self) -> &CaptionEngine {
        &self.engine
    }

    /// Validate, decode and caption one file.
    pub async fn caption_file(&self, path: &Path) -> CaptionResult<CaptionRecord> {
        let start = Instant::now();

        self.validator.validate(path)?;
        let decoded = self.decoder.decode(path).await?;
        let caption = self.caption_image(decoded.image, path).await?;

        Ok(CaptionRecord {
            file_path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            width: decoded.width,
            height: decoded.height,
            format: format_name(decoded.format).to_string(),
            caption,
            model: self.engine.model_name().to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Caption an already-decoded image. `source` is only used in errors.
    pub async fn caption_image(&self, image: DynamicImage, source: &Path) -> CaptionResult<String> {
        let engine = Arc::clone(&self.engine);
        let budget = Duration::from_millis(self.generate_timeout_ms);

        match timeout(
            budget,
            tokio::task::spawn_blocking(move || engine.predict(&image)),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                tracing::error!("Caption task for {} failed: {join}", source.display());
                Err(CaptionError::inference(format!("Caption task failed: {join}")))
            }
            Err(_) => {
                tracing::warn!(
                    "Caption generation for {} exceeded {}ms",
                    source.display(),
                    self.generate_timeout_ms
                );
                Err(CaptionError::Timeout {
                    path: source.to_path_buf(),
                    stage: "generate".to_string(),
                    timeout_ms: self.generate_timeout_ms,
                })
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }
}
