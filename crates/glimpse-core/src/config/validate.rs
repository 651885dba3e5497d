//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

/// Widest beam search accepted. Each step runs the decoder over every beam,
/// so anything larger is almost certainly a typo.
pub const MAX_NUM_BEAMS: usize = 64;

/// Shortest usable `max_length`: the decoder start token plus one generated
/// token.
pub const MIN_MAX_LENGTH: usize = 2;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "model_name must not be empty".into(),
            ));
        }
        if self.max_length < MIN_MAX_LENGTH {
            return Err(ConfigError::ValidationError(format!(
                "max_length must be at least {MIN_MAX_LENGTH}"
            )));
        }
        if self.num_beams == 0 || self.num_beams > MAX_NUM_BEAMS {
            return Err(ConfigError::ValidationError(format!(
                "num_beams must be between 1 and {MAX_NUM_BEAMS}"
            )));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.generate_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.generate_timeout_ms must be > 0".into(),
            ));
        }
        if !self.generation.length_penalty.is_finite() {
            return Err(ConfigError::ValidationError(
                "generation.length_penalty must be a finite number".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_max_length() {
        let config = Config {
            max_length: 1,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_length"));
    }

    #[test]
    fn test_validate_rejects_num_beams_out_of_range() {
        let mut config = Config {
            num_beams: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("num_beams"));

        config.num_beams = MAX_NUM_BEAMS + 1;
        assert!(config.validate().is_err());

        config.num_beams = MAX_NUM_BEAMS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_model_name() {
        let config = Config {
            model_name: "   ".to_string(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model_name"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.generate_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("generate_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_nan_length_penalty() {
        let mut config = Config::default();
        config.generation.length_penalty = f32::NAN;
        assert!(config.validate().is_err());
    }
}
