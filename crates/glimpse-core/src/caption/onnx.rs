//! Vision-encoder-decoder inference via ONNX Runtime.
//!
//! A model directory holds an ONNX export split into an encoder and a decoder
//! (the layout produced by `optimum` exports on the HuggingFace hub), plus the
//! tokenizer and preprocessing configs.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array3, Array4};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use serde::Deserialize;

use super::device::Device;
use super::model::{
    ArtifactLoader, CaptionModel, Detokenizer, EncoderOutput, SpecialTokens,
};
use super::preprocess::FeatureExtractor;
use super::tokenizer::HfDetokenizer;
use crate::error::{CaptionError, CaptionResult};

/// A file that makes up a model, with its location in the hub repository.
#[derive(Debug, Clone, Copy)]
pub struct ModelFile {
    /// Path inside the hub repository
    pub remote: &'static str,
    /// File name inside the local model directory
    pub local: &'static str,
}

pub const ENCODER_FILE: &str = "encoder_model.onnx";
pub const DECODER_FILE: &str = "decoder_model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const PREPROCESSOR_FILE: &str = "preprocessor_config.json";
pub const MODEL_CONFIG_FILE: &str = "config.json";

/// Every file needed to load a model.
pub const MODEL_FILES: &[ModelFile] = &[
    ModelFile {
        remote: "onnx/encoder_model.onnx",
        local: ENCODER_FILE,
    },
    ModelFile {
        remote: "onnx/decoder_model.onnx",
        local: DECODER_FILE,
    },
    ModelFile {
        remote: "tokenizer.json",
        local: TOKENIZER_FILE,
    },
    ModelFile {
        remote: "preprocessor_config.json",
        local: PREPROCESSOR_FILE,
    },
    ModelFile {
        remote: "config.json",
        local: MODEL_CONFIG_FILE,
    },
];

/// Token ids as they appear in a vision-encoder-decoder `config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenConfig {
    decoder_start_token_id: Option<u32>,
    bos_token_id: Option<u32>,
    eos_token_id: Option<u32>,
    pad_token_id: Option<u32>,
    decoder: Option<Box<TokenConfig>>,
}

impl TokenConfig {
    fn resolve(&self) -> Result<SpecialTokens, String> {
        let decoder = self.decoder.as_deref();

        let decoder_start = self
            .decoder_start_token_id
            .or(decoder.and_then(|d| d.decoder_start_token_id))
            .or(decoder.and_then(|d| d.bos_token_id))
            .or(self.bos_token_id)
            .ok_or("config.json has no decoder_start_token_id or bos_token_id")?;
        let eos = self
            .eos_token_id
            .or(decoder.and_then(|d| d.eos_token_id))
            .ok_or("config.json has no eos_token_id")?;
        let pad = self.pad_token_id.or(decoder.and_then(|d| d.pad_token_id));

        Ok(SpecialTokens {
            decoder_start,
            eos,
            pad,
        })
    }
}

/// Read special token ids from a model's `config.json`.
pub fn read_special_tokens(path: &Path) -> Result<SpecialTokens, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let config: TokenConfig =
        serde_json::from_str(&content).map_err(|e| format!("Invalid {}: {e}", path.display()))?;
    config.resolve()
}

/// Encoder and decoder ONNX sessions for one model.
///
/// Uses a `Mutex` per session because `Session::run` requires `&mut self`;
/// concurrent callers are serialized.
pub struct OnnxCaptionModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    /// Name of the encoder input tensor (detected from model metadata).
    encoder_input: String,
    /// Whether the decoder declares an `encoder_attention_mask` input.
    decoder_takes_mask: bool,
    special_tokens: SpecialTokens,
}

impl OnnxCaptionModel {
    /// Load encoder/decoder sessions from a model directory.
    pub fn load(model_dir: &Path, model: &str, device: Device) -> CaptionResult<Self> {
        let load_error = |message: String| CaptionError::ModelLoad {
            model: model.to_string(),
            message,
        };

        let encoder_path = require_file(model_dir, ENCODER_FILE, model)?;
        let decoder_path = require_file(model_dir, DECODER_FILE, model)?;
        let config_path = require_file(model_dir, MODEL_CONFIG_FILE, model)?;

        let special_tokens = read_special_tokens(&config_path).map_err(load_error)?;
        let encoder = build_session(&encoder_path, device, model)?;
        let decoder = build_session(&decoder_path, device, model)?;

        let encoder_input = encoder
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());
        let decoder_inputs: Vec<&str> = decoder.inputs().iter().map(|i| i.name()).collect();
        if !decoder_inputs.contains(&"input_ids")
            || !decoder_inputs.contains(&"encoder_hidden_states")
        {
            return Err(load_error(format!(
                "Decoder inputs {decoder_inputs:?} do not include input_ids and encoder_hidden_states"
            )));
        }
        let decoder_takes_mask = decoder_inputs.contains(&"encoder_attention_mask");

        tracing::debug!(
            "Loaded ONNX sessions from {:?} (encoder input: {:?}, decoder inputs: {:?}, tokens: {:?})",
            model_dir,
            encoder_input,
            decoder_inputs,
            special_tokens
        );

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            encoder_input,
            decoder_takes_mask,
            special_tokens,
        })
    }
}

impl CaptionModel for OnnxCaptionModel {
    fn encode(&self, pixel_values: &Array4<f32>) -> CaptionResult<EncoderOutput> {
        let shape: Vec<i64> = pixel_values.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = pixel_values.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| CaptionError::inference(format!("Failed to create input tensor: {e}")))?;

        let mut session = self
            .encoder
            .lock()
            .map_err(|e| CaptionError::inference(format!("Encoder lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![self.encoder_input.as_str() => input_value])
            .map_err(|e| CaptionError::inference(format!("Encoder inference failed: {e}")))?;

        let hidden = outputs
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .ok_or_else(|| CaptionError::inference("Encoder did not produce last_hidden_state"))?;

        let (shape, data) = hidden
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptionError::inference(format!("Failed to extract last_hidden_state: {e}")))?;

        if shape.len() != 3 {
            return Err(CaptionError::inference(format!(
                "Unexpected last_hidden_state shape: {:?}",
                shape
            )));
        }
        let dims = (shape[0] as usize, shape[1] as usize, shape[2] as usize);
        let hidden_states = Array3::from_shape_vec(dims, data.to_vec())
            .map_err(|e| CaptionError::inference(format!("Bad encoder output layout: {e}")))?;

        Ok(EncoderOutput { hidden_states })
    }

    fn next_token_logits(
        &self,
        encoder: &EncoderOutput,
        sequences: &[Vec<u32>],
    ) -> CaptionResult<Vec<Vec<f32>>> {
        let batch = sequences.len();
        let Some(seq_len) = sequences.first().map(Vec::len) else {
            return Ok(Vec::new());
        };
        if sequences.iter().any(|s| s.len() != seq_len) {
            return Err(CaptionError::inference(
                "Decoder batch has sequences of different lengths",
            ));
        }

        let input_ids: Vec<i64> = sequences.iter().flatten().map(|&t| t as i64).collect();

        // Repeat the single image's hidden states once per beam.
        let (_, enc_seq, hidden) = encoder.hidden_states.dim();
        let single: Vec<f32> = encoder.hidden_states.iter().copied().collect();
        let mut repeated = Vec::with_capacity(batch * single.len());
        for _ in 0..batch {
            repeated.extend_from_slice(&single);
        }

        let ids_value = Value::from_array((vec![batch as i64, seq_len as i64], input_ids))
            .map_err(|e| CaptionError::inference(format!("Failed to create input_ids: {e}")))?;
        let states_value = Value::from_array((
            vec![batch as i64, enc_seq as i64, hidden as i64],
            repeated,
        ))
        .map_err(|e| CaptionError::inference(format!("Failed to create encoder states: {e}")))?;

        let mut session = self
            .decoder
            .lock()
            .map_err(|e| CaptionError::inference(format!("Decoder lock poisoned: {e}")))?;

        let outputs = if self.decoder_takes_mask {
            let mask_value =
                Value::from_array((vec![batch as i64, enc_seq as i64], vec![1i64; batch * enc_seq]))
                    .map_err(|e| {
                        CaptionError::inference(format!("Failed to create attention mask: {e}"))
                    })?;
            session.run(ort::inputs![
                "input_ids" => ids_value,
                "encoder_hidden_states" => states_value,
                "encoder_attention_mask" => mask_value
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_value,
                "encoder_hidden_states" => states_value
            ])
        }
        .map_err(|e| CaptionError::inference(format!("Decoder inference failed: {e}")))?;

        let logits = outputs
            .iter()
            .find(|(name, _)| *name == "logits")
            .ok_or_else(|| CaptionError::inference("Decoder did not produce logits"))?;

        let (shape, data) = logits
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptionError::inference(format!("Failed to extract logits: {e}")))?;

        // logits: [batch, seq_len, vocab]; keep the last position of each row.
        if shape.len() != 3 || shape[0] as usize != batch {
            return Err(CaptionError::inference(format!(
                "Unexpected logits shape: {:?}",
                shape
            )));
        }
        let steps = shape[1] as usize;
        let vocab = shape[2] as usize;
        let rows = (0..batch)
            .map(|b| {
                let start = (b * steps + steps - 1) * vocab;
                data[start..start + vocab].to_vec()
            })
            .collect();

        Ok(rows)
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.special_tokens
    }
}

fn require_file(model_dir: &Path, name: &str, model: &str) -> CaptionResult<PathBuf> {
    let path = model_dir.join(name);
    if path.exists() {
        Ok(path)
    } else {
        Err(CaptionError::ModelLoad {
            model: model.to_string(),
            message: format!(
                "{} not found. Run `glimpse models download` first.",
                path.display()
            ),
        })
    }
}

fn build_session(path: &Path, device: Device, model: &str) -> CaptionResult<Session> {
    let load_error = |message: String| CaptionError::ModelLoad {
        model: model.to_string(),
        message,
    };

    let mut builder = Session::builder()
        .map_err(|e| load_error(format!("Failed to create ONNX session builder: {e}")))?;

    if device == Device::Cuda {
        builder = builder
            .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
            .map_err(|e| load_error(format!("Failed to register CUDA execution provider: {e}")))?;
    }

    builder
        .commit_from_file(path)
        .map_err(|e| load_error(format!("Failed to load ONNX model {}: {e}", path.display())))
}

/// Resolves model, feature extractor and detokenizer from a directory on disk.
pub struct OnnxArtifactLoader {
    model_name: String,
    model_dir: PathBuf,
}

impl OnnxArtifactLoader {
    pub fn new(model_name: impl Into<String>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_name: model_name.into(),
            model_dir: model_dir.into(),
        }
    }

    /// Files from [`MODEL_FILES`] that are missing locally.
    pub fn missing_files(model_dir: &Path) -> Vec<&'static str> {
        MODEL_FILES
            .iter()
            .filter(|f| !model_dir.join(f.local).exists())
            .map(|f| f.local)
            .collect()
    }
}

impl ArtifactLoader for OnnxArtifactLoader {
    fn load_model(&self, device: Device) -> CaptionResult<Box<dyn CaptionModel>> {
        tracing::info!("Loading ONNX model from {:?} on {}", self.model_dir, device);
        let model = OnnxCaptionModel::load(&self.model_dir, &self.model_name, device)?;
        Ok(Box::new(model))
    }

    fn load_feature_extractor(&self) -> CaptionResult<FeatureExtractor> {
        let path = require_file(&self.model_dir, PREPROCESSOR_FILE, &self.model_name)?;
        FeatureExtractor::from_file(&path, &self.model_name)
    }

    fn load_detokenizer(&self) -> CaptionResult<Box<dyn Detokenizer>> {
        let path = require_file(&self.model_dir, TOKENIZER_FILE, &self.model_name)?;
        let detokenizer = HfDetokenizer::from_file(&path, &self.model_name)?;
        Ok(Box::new(detokenizer))
    }
}
