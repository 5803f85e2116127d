//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.embed_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.embed_timeout_ms must be > 0".into(),
            ));
        }
        if self.embedding.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.image_size must be > 0".into(),
            ));
        }
        if self.embedding.max_text_length == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.max_text_length must be > 0".into(),
            ));
        }
        if self.embedding.text_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.text_batch_size must be > 0".into(),
            ));
        }
        if !self.embedding.prompt_template.contains("{term}") {
            return Err(ConfigError::ValidationError(
                "embedding.prompt_template must contain {term}".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.ranking.threshold) {
            return Err(ConfigError::ValidationError(
                "ranking.threshold must be between -1.0 and 1.0".into(),
            ));
        }
        if self.ranking.max_keywords == 0 {
            return Err(ConfigError::ValidationError(
                "ranking.max_keywords must be > 0".into(),
            ));
        }
        if self.ranking.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "ranking.max_image_dimension must be > 0".into(),
            ));
        }
        if self.catalog.supported_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "catalog.supported_formats must not be empty".into(),
            ));
        }
        Ok(())
    }
}
