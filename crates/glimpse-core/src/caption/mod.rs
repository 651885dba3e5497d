//! Image captioning engine.
//!
//! The engine owns the lifecycle of a pretrained vision-encoder-decoder model
//! and exposes one inference operation: image in, caption (or typed failure)
//! out.
//!
//! ```text
//! Uninitialized ──load()──▶ Loading ──▶ Ready ──predict()──▶ Ready
//!                              │
//!                              └──────▶ LoadFailed ──load()──▶ Loading
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use glimpse_core::{CaptionEngine, Config};
//!
//! let config = Config::load()?;
//! let mut engine = CaptionEngine::new(&config);
//! engine.load()?;
//! let caption = engine.predict(&image::open("dog.jpg")?)?;
//! ```

pub mod beam;
pub mod device;
pub mod model;
pub mod onnx;
pub mod preprocess;
pub mod tokenizer;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use image::DynamicImage;

use crate::config::Config;
use crate::error::{CaptionError, CaptionResult};

pub use self::beam::BeamSearch;
pub use self::device::Device;
pub use self::model::{ArtifactLoader, CaptionModel, Detokenizer, EncoderOutput, SpecialTokens};
pub use self::onnx::OnnxArtifactLoader;
pub use self::preprocess::{normalize_color, FeatureExtractor};

use self::model::Artifacts;

/// Observable lifecycle state of a [`CaptionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    LoadFailed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::LoadFailed => "load failed",
        };
        f.write_str(name)
    }
}

/// Artifacts only exist while Ready.
enum Lifecycle {
    Uninitialized,
    Loading,
    Ready(Artifacts),
    LoadFailed(String),
}

/// Owns model lifecycle and turns images into captions.
pub struct CaptionEngine {
    model_name: String,
    search: BeamSearch,
    device: Device,
    loader: Box<dyn ArtifactLoader>,
    lifecycle: Lifecycle,
    span: tracing::Span,
}

impl CaptionEngine {
    /// Create an engine for the configured model, backed by ONNX files in
    /// the model directory. Nothing is loaded until [`load`](Self::load).
    ///
    /// The compute device is resolved here, once.
    pub fn new(config: &Config) -> Self {
        let device = Device::resolve(config.device);
        let loader = OnnxArtifactLoader::new(&config.model_name, config.model_path());
        Self::with_loader(config, device, Box::new(loader))
    }

    /// Create an engine with a custom artifact source.
    pub fn with_loader(config: &Config, device: Device, loader: Box<dyn ArtifactLoader>) -> Self {
        let span = tracing::info_span!(
            "caption_engine",
            model = %config.model_name,
            device = %device
        );
        Self {
            model_name: config.model_name.clone(),
            search: BeamSearch {
                max_length: config.max_length,
                num_beams: config.num_beams,
                length_penalty: config.generation.length_penalty,
            },
            device,
            loader,
            lifecycle: Lifecycle::Uninitialized,
            span,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        match self.lifecycle {
            Lifecycle::Uninitialized => EngineState::Uninitialized,
            Lifecycle::Loading => EngineState::Loading,
            Lifecycle::Ready(_) => EngineState::Ready,
            Lifecycle::LoadFailed(_) => EngineState::LoadFailed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Message from the most recent failed load, if the engine is in `LoadFailed`.
    pub fn load_error(&self) -> Option<&str> {
        match &self.lifecycle {
            Lifecycle::LoadFailed(message) => Some(message),
            _ => None,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn beam_search(&self) -> BeamSearch {
        self.search
    }

    /// Acquire the generation model, feature extractor and detokenizer.
    ///
    /// All three must succeed for the engine to become Ready; otherwise it
    /// ends in `LoadFailed` and holds nothing. Calling `load` on a Ready
    /// engine does nothing. A failed engine may be loaded again.
    pub fn load(&mut self) -> CaptionResult<()> {
        let _enter = self.span.enter();

        if let Lifecycle::Ready(_) = self.lifecycle {
            tracing::debug!("Model {} already loaded, skipping", self.model_name);
            return Ok(());
        }

        self.lifecycle = Lifecycle::Loading;
        let start = Instant::now();

        let acquired = panic::catch_unwind(AssertUnwindSafe(|| self.acquire()))
            .unwrap_or_else(|payload| {
                Err(CaptionError::ModelLoad {
                    model: self.model_name.clone(),
                    message: format!("loader panicked: {}", panic_message(payload.as_ref())),
                })
            });

        match acquired {
            Ok(artifacts) => {
                self.lifecycle = Lifecycle::Ready(artifacts);
                tracing::info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model {} loaded successfully.",
                    self.model_name
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to load model: {e}");
                self.lifecycle = Lifecycle::LoadFailed(e.to_string());
                Err(e)
            }
        }
    }

    fn acquire(&self) -> CaptionResult<Artifacts> {
        let as_load_error = |e: CaptionError| match e {
            CaptionError::ModelLoad { .. } => e,
            other => CaptionError::ModelLoad {
                model: self.model_name.clone(),
                message: other.to_string(),
            },
        };

        let model = self.loader.load_model(self.device).map_err(as_load_error)?;
        let feature_extractor = self
            .loader
            .load_feature_extractor()
            .map_err(as_load_error)?;
        let detokenizer = self.loader.load_detokenizer().map_err(as_load_error)?;

        Ok(Artifacts {
            model,
            feature_extractor,
            detokenizer,
        })
    }

    /// Generate a caption for an image.
    ///
    /// Fails fast with [`CaptionError::NotReady`] unless the engine is Ready.
    /// Every other failure, a panic inside the model or tokenizer included,
    /// is reported as [`CaptionError::Inference`]. The returned caption is
    /// trimmed and never empty.
    pub fn predict(&self, image: &DynamicImage) -> CaptionResult<String> {
        let _enter = self.span.enter();

        let artifacts = match &self.lifecycle {
            Lifecycle::Ready(artifacts) => artifacts,
            _ => {
                let err = CaptionError::NotReady {
                    state: self.state(),
                };
                tracing::error!("{err}");
                return Err(err);
            }
        };

        let start = Instant::now();
        let generated = panic::catch_unwind(AssertUnwindSafe(|| self.generate(artifacts, image)))
            .unwrap_or_else(|payload| {
                Err(CaptionError::inference(format!(
                    "generation panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match generated {
            Ok(caption) => {
                tracing::info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Caption Generated Successfully."
                );
                tracing::debug!("Caption: {caption:?}");
                Ok(caption)
            }
            Err(e) => {
                tracing::error!("Generation Caption Failed: {e}");
                Err(e)
            }
        }
    }

    fn generate(&self, artifacts: &Artifacts, image: &DynamicImage) -> CaptionResult<String> {
        let as_inference = |e: CaptionError| match e {
            CaptionError::Inference { .. } => e,
            other => CaptionError::inference(other.to_string()),
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(CaptionError::inference("Image has zero width or height"));
        }

        let rgb = normalize_color(image);
        let pixel_values = artifacts.feature_extractor.extract(&rgb);
        let encoded = artifacts
            .model
            .encode(&pixel_values)
            .map_err(as_inference)?;
        let tokens = self
            .search
            .run(artifacts.model.as_ref(), &encoded)
            .map_err(as_inference)?;
        let text = artifacts
            .detokenizer
            .decode(&tokens)
            .map_err(as_inference)?;

        let caption = text.trim();
        if caption.is_empty() {
            return Err(CaptionError::inference("Model produced an empty caption"));
        }
        Ok(caption.to_string())
    }
}

/// Text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl fmt::Debug for CaptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionEngine")
            .field("model_name", &self.model_name)
            .field("device", &self.device)
            .field("search", &self.search)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::{Array3, Array4};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WORDS: [&str; 3] = ["a", "dog", "running"];

    /// Emits `a dog running` then EOS, or EOS straight away when `silent`.
    struct ScriptedModel {
        silent: bool,
        panics: bool,
    }

    impl CaptionModel for ScriptedModel {
        fn encode(&self, pixel_values: &Array4<f32>) -> CaptionResult<EncoderOutput> {
            assert_eq!(pixel_values.shape(), &[1, 3, 224, 224]);
            Ok(EncoderOutput {
                hidden_states: Array3::zeros((1, 4, 8)),
            })
        }

        fn next_token_logits(
            &self,
            _encoder: &EncoderOutput,
            sequences: &[Vec<u32>],
        ) -> CaptionResult<Vec<Vec<f32>>> {
            if self.panics {
                panic!("decoder index out of bounds");
            }
            Ok(sequences
                .iter()
                .map(|seq| {
                    let mut row = vec![0.0f32; 2 + WORDS.len()];
                    let next = if self.silent || seq.len() > WORDS.len() {
                        1
                    } else {
                        seq.len() + 1
                    };
                    row[next] = 10.0;
                    row
                })
                .collect())
        }

        fn special_tokens(&self) -> SpecialTokens {
            SpecialTokens {
                decoder_start: 0,
                eos: 1,
                pad: None,
            }
        }
    }

    struct WordDetokenizer;

    impl Detokenizer for WordDetokenizer {
        fn decode(&self, ids: &[u32]) -> CaptionResult<String> {
            let words: Vec<&str> = ids.iter().map(|&id| WORDS[id as usize - 2]).collect();
            Ok(format!("  {}  ", words.join(" ")))
        }
    }

    #[derive(Default)]
    struct FakeLoader {
        silent: bool,
        panic_in_decoder: bool,
        panic_in_loader: bool,
        fail_model: bool,
        fail_extractor: bool,
        fail_detokenizer: bool,
        /// Fail this many model loads before succeeding
        transient_failures: usize,
        attempts: AtomicUsize,
    }

    impl ArtifactLoader for FakeLoader {
        fn load_model(&self, _device: Device) -> CaptionResult<Box<dyn CaptionModel>> {
            if self.panic_in_loader {
                panic!("corrupt weights");
            }
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_model || attempt < self.transient_failures {
                return Err(CaptionError::ModelLoad {
                    model: "fake".into(),
                    message: "weights unavailable".into(),
                });
            }
            Ok(Box::new(ScriptedModel {
                silent: self.silent,
                panics: self.panic_in_decoder,
            }))
        }

        fn load_feature_extractor(&self) -> CaptionResult<FeatureExtractor> {
            if self.fail_extractor {
                return Err(CaptionError::FileNotFound("preprocessor_config.json".into()));
            }
            Ok(FeatureExtractor::default())
        }

        fn load_detokenizer(&self) -> CaptionResult<Box<dyn Detokenizer>> {
            if self.fail_detokenizer {
                return Err(CaptionError::ModelLoad {
                    model: "fake".into(),
                    message: "tokenizer missing".into(),
                });
            }
            Ok(Box::new(WordDetokenizer))
        }
    }

    fn config() -> Config {
        Config {
            model_name: "fake/captioner".into(),
            max_length: 16,
            num_beams: 4,
            ..Config::default()
        }
    }

    fn engine(loader: FakeLoader) -> CaptionEngine {
        CaptionEngine::with_loader(&config(), Device::Cpu, Box::new(loader))
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([120, 80, 40])))
    }

    #[test]
    fn test_new_engine_is_uninitialized() {
        let engine = engine(FakeLoader::default());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(engine.model_name(), "fake/captioner");
        assert_eq!(engine.beam_search().num_beams, 4);
        assert!(engine.load_error().is_none());
    }

    #[test]
    fn test_load_then_predict() {
        let mut engine = engine(FakeLoader::default());
        engine.load().unwrap();
        assert!(engine.is_ready());

        let caption = engine.predict(&image()).unwrap();
        assert_eq!(caption, "a dog running");
    }

    #[test]
    fn test_predict_before_load_is_not_ready() {
        let engine = engine(FakeLoader::default());
        let err = engine.predict(&image()).unwrap_err();
        assert!(err.is_precondition());
        assert!(matches!(
            err,
            CaptionError::NotReady {
                state: EngineState::Uninitialized
            }
        ));
    }

    #[test]
    fn test_any_artifact_failure_leaves_engine_failed() {
        let loaders = [
            FakeLoader {
                fail_model: true,
                ..Default::default()
            },
            FakeLoader {
                fail_extractor: true,
                ..Default::default()
            },
            FakeLoader {
                fail_detokenizer: true,
                ..Default::default()
            },
        ];

        for loader in loaders {
            let mut engine = engine(loader);
            let err = engine.load().unwrap_err();
            assert!(matches!(err, CaptionError::ModelLoad { .. }));
            assert_eq!(engine.state(), EngineState::LoadFailed);
            assert!(engine.load_error().is_some());

            let err = engine.predict(&image()).unwrap_err();
            assert!(matches!(
                err,
                CaptionError::NotReady {
                    state: EngineState::LoadFailed
                }
            ));
        }
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let mut engine = engine(FakeLoader {
            transient_failures: 1,
            ..Default::default()
        });
        assert!(engine.load().is_err());
        assert_eq!(engine.state(), EngineState::LoadFailed);

        engine.load().unwrap();
        assert!(engine.is_ready());
        assert!(engine.load_error().is_none());
    }

    #[test]
    fn test_load_when_ready_is_noop() {
        let mut engine = engine(FakeLoader::default());
        engine.load().unwrap();
        engine.load().unwrap();
        assert!(engine.is_ready());
    }

    #[test]
    fn test_predict_is_deterministic() {
        let mut engine = engine(FakeLoader::default());
        engine.load().unwrap();
        let first = engine.predict(&image()).unwrap();
        let second = engine.predict(&image()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_predict_accepts_grayscale() {
        let mut engine = engine(FakeLoader::default());
        engine.load().unwrap();
        let gray = DynamicImage::new_luma8(30, 30);
        assert_eq!(engine.predict(&gray).unwrap(), "a dog running");
    }

    #[test]
    fn test_empty_caption_is_inference_error() {
        let mut engine = engine(FakeLoader {
            silent: true,
            ..Default::default()
        });
        engine.load().unwrap();
        let err = engine.predict(&image()).unwrap_err();
        assert!(matches!(err, CaptionError::Inference { .. }));
        assert!(engine.is_ready());
    }

    #[test]
    fn test_zero_sized_image_is_inference_error() {
        let mut engine = engine(FakeLoader::default());
        engine.load().unwrap();
        let err = engine.predict(&DynamicImage::new_rgb8(0, 0)).unwrap_err();
        assert!(matches!(err, CaptionError::Inference { .. }));
    }

    #[test]
    fn test_panic_in_generation_is_inference_error() {
        let mut engine = engine(FakeLoader {
            panic_in_decoder: true,
            ..Default::default()
        });
        engine.load().unwrap();

        let err = engine.predict(&image()).unwrap_err();
        match err {
            CaptionError::Inference { message } => {
                assert!(message.contains("decoder index out of bounds"))
            }
            other => panic!("expected inference error, got {other:?}"),
        }
        assert!(engine.is_ready());
    }

    #[test]
    fn test_panic_in_loader_leaves_engine_failed() {
        let mut engine = engine(FakeLoader {
            panic_in_loader: true,
            ..Default::default()
        });

        let err = engine.load().unwrap_err();
        assert!(matches!(err, CaptionError::ModelLoad { .. }));
        assert_eq!(engine.state(), EngineState::LoadFailed);
        assert!(engine.load_error().unwrap().contains("corrupt weights"));
    }

    #[test]
    fn test_engine_state_display() {
        assert_eq!(EngineState::LoadFailed.to_string(), "load failed");
        assert_eq!(EngineState::Ready.to_string(), "ready");
    }
}
