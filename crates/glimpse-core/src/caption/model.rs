//! The three artifacts a captioning engine needs, and the seams where they
//! are acquired.
//!
//! A model is resolved into a generation model ([`CaptionModel`]), an image
//! feature extractor ([`FeatureExtractor`]) and a detokenizer
//! ([`Detokenizer`]). [`ArtifactLoader`] resolves all three for one model id;
//! the ONNX-backed implementation lives in [`super::onnx`].

use ndarray::{Array3, Array4};

use super::device::Device;
use super::preprocess::FeatureExtractor;
use crate::error::CaptionResult;

/// Token ids that drive generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    /// First token fed to the decoder
    pub decoder_start: u32,
    /// Token that ends a hypothesis
    pub eos: u32,
    /// Padding token, stripped from output if present
    pub pad: Option<u32>,
}

/// Vision encoder output for a single image: `[1, sequence, hidden]`.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    pub hidden_states: Array3<f32>,
}

/// A vision-encoder-decoder generation model.
///
/// Implementations must be deterministic: the same pixels and sequences give
/// the same logits.
pub trait CaptionModel: Send + Sync {
    /// Encode preprocessed pixels (`[1, 3, H, W]`).
    fn encode(&self, pixel_values: &Array4<f32>) -> CaptionResult<EncoderOutput>;

    /// Logits over the vocabulary for the token following each sequence.
    ///
    /// All sequences have the same length. Returns one row per sequence.
    fn next_token_logits(
        &self,
        encoder: &EncoderOutput,
        sequences: &[Vec<u32>],
    ) -> CaptionResult<Vec<Vec<f32>>>;

    /// Special token ids for this model.
    fn special_tokens(&self) -> SpecialTokens;
}

/// Turns generated token ids into text.
pub trait Detokenizer: Send + Sync {
    /// Decode ids to text, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> CaptionResult<String>;
}

/// Resolves the artifacts for one model id.
///
/// Each method maps its own failure to [`crate::error::CaptionError::ModelLoad`].
pub trait ArtifactLoader: Send + Sync {
    /// Acquire the generation model, placed on `device`.
    fn load_model(&self, device: Device) -> CaptionResult<Box<dyn CaptionModel>>;

    /// Acquire the image feature extractor.
    fn load_feature_extractor(&self) -> CaptionResult<FeatureExtractor>;

    /// Acquire the detokenizer.
    fn load_detokenizer(&self) -> CaptionResult<Box<dyn Detokenizer>>;
}

/// Everything a Ready engine holds.
pub(crate) struct Artifacts {
    pub model: Box<dyn CaptionModel>,
    pub feature_extractor: FeatureExtractor,
    pub detokenizer: Box<dyn Detokenizer>,
}
