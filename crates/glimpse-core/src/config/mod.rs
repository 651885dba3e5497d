//! Configuration provider for Glimpse.
//!
//! Configuration is read once from `config.yaml` (or a `.toml` file) and is
//! immutable afterwards. Three keys are required: `model_name`, `max_length`
//! and `num_beams`. Everything else has defaults.

mod types;
mod validate;

pub use types::*;
pub use validate::{MAX_NUM_BEAMS, MIN_MAX_LENGTH};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model when writing a fresh config file.
pub const DEFAULT_MODEL_NAME: &str = "Xenova/vit-gpt2-image-captioning";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the pretrained vision-encoder-decoder model
    pub model_name: String,

    /// Upper bound on generated tokens (including the start token)
    pub max_length: usize,

    /// Beam search width
    pub num_beams: usize,

    /// Directory where model artifacts are stored
    pub model_dir: PathBuf,

    /// Compute device preference
    pub device: DevicePreference,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Beam search tuning
    pub generation: GenerationConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// On-disk shape of the document. Required keys are optional here so that a
/// missing key is reported by name instead of surfacing later.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    model_name: Option<String>,
    max_length: Option<usize>,
    num_beams: Option<usize>,
    model_dir: Option<PathBuf>,
    device: DevicePreference,
    limits: LimitsConfig,
    generation: GenerationConfig,
    logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            max_length: 16,
            num_beams: 4,
            model_dir: default_model_dir(),
            device: DevicePreference::default(),
            limits: LimitsConfig::default(),
            generation: GenerationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (`./config.yaml`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a specific file path.
    ///
    /// The format is picked from the extension: `.toml` is parsed as TOML,
    /// anything else as YAML.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let span = tracing::info_span!("config", path = %path.display());
        let _enter = span.enter();

        match Self::read(path) {
            Ok(config) => {
                tracing::info!("Config file loaded successfully.");
                Ok(config)
            }
            Err(e) => {
                tracing::error!("{e}");
                Err(e)
            }
        }
    }

    /// Parse a configuration document held in memory.
    ///
    /// `path` is only used for format detection and error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::ParseError {
            path: path.to_path_buf(),
            message,
        };

        let raw: RawConfig = if is_toml(path) {
            toml::from_str(content).map_err(|e| parse_error(e.to_string()))?
        } else {
            serde_yaml::from_str::<Option<RawConfig>>(content)
                .map_err(|e| parse_error(e.to_string()))?
                .unwrap_or_default()
        };

        let model_name = raw
            .model_name
            .ok_or_else(|| parse_error("missing required key `model_name`".into()))?;
        let max_length = raw
            .max_length
            .ok_or_else(|| parse_error("missing required key `max_length`".into()))?;
        let num_beams = raw
            .num_beams
            .ok_or_else(|| parse_error("missing required key `num_beams`".into()))?;

        // Required keys must also be usable, so their bounds are parse errors
        // just like a negative or non-numeric value would be.
        if max_length < MIN_MAX_LENGTH {
            return Err(parse_error(format!(
                "`max_length` must be at least {MIN_MAX_LENGTH} (start token plus one generated token)"
            )));
        }
        if num_beams == 0 {
            return Err(parse_error("`num_beams` must be a positive integer".into()));
        }

        let config = Self {
            model_name,
            max_length,
            num_beams,
            model_dir: raw.model_dir.unwrap_or_else(default_model_dir),
            device: raw.device,
            limits: raw.limits,
            generation: raw.generation,
            logging: raw.logging,
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Read only the `logging` section of a config file, without validation.
    ///
    /// Logging has to be set up before the full config is loaded (so that
    /// loading itself is logged). Any problem here yields the defaults; the
    /// real error surfaces from [`Config::load_from`].
    pub fn logging_settings(path: &Path) -> LoggingConfig {
        #[derive(Default, Deserialize)]
        #[serde(default)]
        struct LoggingOnly {
            logging: LoggingConfig,
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            return LoggingConfig::default();
        };
        let parsed = if is_toml(path) {
            toml::from_str::<LoggingOnly>(&content).ok()
        } else {
            serde_yaml::from_str::<Option<LoggingOnly>>(&content)
                .ok()
                .flatten()
        };
        parsed.map(|p| p.logging).unwrap_or_default()
    }

    /// Get the default config file path (`config.yaml` in the working directory).
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.yaml")
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Directory holding the artifacts of the configured model.
    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(&self.model_name)
    }

    /// Serialize the config to a YAML string.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

/// Platform data directory for downloaded models.
///
/// - Linux: ~/.local/share/glimpse/models
/// - macOS: ~/Library/Application Support/rs.glimpse.glimpse/models
///
/// Falls back to ~/.glimpse/models if directory detection fails.
fn default_model_dir() -> PathBuf {
    directories::ProjectDirs::from("rs", "glimpse", "glimpse")
        .map(|dirs| dirs.data_dir().join("models"))
        .unwrap_or_else(|| PathBuf::from("~/.glimpse/models"))
}
