//! HuggingFace `tokenizers` detokenizer.

use std::path::Path;

use super::model::Detokenizer;
use crate::error::{CaptionError, CaptionResult};

/// Detokenizer backed by a `tokenizer.json` file.
pub struct HfDetokenizer {
    tokenizer: tokenizers::Tokenizer,
}

impl HfDetokenizer {
    /// Load a tokenizer from its JSON definition.
    pub fn from_file(path: &Path, model: &str) -> CaptionResult<Self> {
        let tokenizer =
            tokenizers::Tokenizer::from_file(path).map_err(|e| CaptionError::ModelLoad {
                model: model.to_string(),
                message: format!("Failed to load tokenizer {}: {e}", path.display()),
            })?;
        Ok(Self { tokenizer })
    }
}

impl Detokenizer for HfDetokenizer {
    fn decode(&self, ids: &[u32]) -> CaptionResult<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| CaptionError::inference(format!("Failed to decode tokens: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal word-level tokenizer: ids 0..=2 are words, 3 is a special token.
    const TOKENIZER_JSON: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 3, "content": "<|endoftext|>", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"a": 0, "dog": 1, "running": 2, "<|endoftext|>": 3},
            "unk_token": "<|endoftext|>"
        }
    }"#;

    #[test]
    fn test_decode_skips_special_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, TOKENIZER_JSON).unwrap();

        let detokenizer = HfDetokenizer::from_file(&path, "test").unwrap();
        let text = detokenizer.decode(&[0, 1, 2, 3]).unwrap();
        assert_eq!(text, "a dog running");
    }

    #[test]
    fn test_invalid_tokenizer_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "not json").unwrap();
        let err = HfDetokenizer::from_file(&path, "test").err().unwrap();
        assert!(matches!(err, CaptionError::ModelLoad { .. }));
    }
}
