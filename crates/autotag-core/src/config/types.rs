//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,

    /// Keyword vocabulary file (Lightroom keyword export format)
    pub keywords_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.autotag/models"),
            keywords_file: PathBuf::from("Foundation List 2.0.1.txt"),
        }
    }
}

/// Catalog source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Extensions picked up when scanning an image folder
    pub supported_formats: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "tif".to_string(),
                "tiff".to_string(),
                "webp".to_string(),
                "nef".to_string(),
                "dng".to_string(),
                "cr2".to_string(),
                "arw".to_string(),
            ],
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,

    /// Embedding timeout in milliseconds
    pub embed_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 200,
            decode_timeout_ms: 10000,
            embed_timeout_ms: 30000,
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Square input size of the vision encoder
    pub image_size: u32,

    /// Token sequence length of the text encoder
    pub max_text_length: usize,

    /// Terms per text encoder inference call
    pub text_batch_size: usize,

    /// Prompt built from each term; `{term}` is replaced by the term
    pub prompt_template: String,

    /// Name of the vision encoder output holding the projected embedding
    pub image_output: String,

    /// Name of the text encoder output holding the projected embedding
    pub text_output: String,

    /// Directory for the persisted vocabulary embedding matrix.
    /// An empty string keeps the matrix in memory only.
    #[serde(with = "optional_path")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "clip-vit-base-patch32".to_string(),
            image_size: 224,
            max_text_length: 77,
            text_batch_size: 256,
            prompt_template: "{term}".to_string(),
            image_output: "image_embeds".to_string(),
            text_output: "text_embeds".to_string(),
            cache_dir: Some(PathBuf::from("~/.autotag/cache")),
        }
    }
}

impl EmbeddingConfig {
    /// Build the text prompt for a vocabulary term.
    pub fn prompt_for(&self, term: &str) -> String {
        self.prompt_template.replace("{term}", term)
    }
}

/// Keyword ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Minimum cosine similarity (exclusive) for a keyword to be suggested
    pub threshold: f32,

    /// Maximum number of keywords per image
    pub max_keywords: usize,

    /// Images with a longer side above this are downscaled before embedding
    pub max_image_dimension: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_keywords: 20,
            max_image_dimension: 1024,
        }
    }
}

/// Sidecar merge settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SidecarConfig {
    /// Replace the existing keyword bag instead of unioning into it
    pub overwrite: bool,
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where to write the keyword report. An empty string disables the report.
    #[serde(with = "optional_path")]
    pub report_path: Option<PathBuf>,

    /// Pretty-print the JSON report
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: Some(PathBuf::from("keyword_suggestions.json")),
            pretty: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// A path that can be switched off with `""`.
///
/// TOML has no null, and an omitted key falls back to the default, so the
/// empty string is the only way to spell `None` in a config file.
mod optional_path {
    use std::path::PathBuf;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        path: &Option<PathBuf>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match path {
            Some(path) => serializer.serialize_str(&path.to_string_lossy()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PathBuf>, D::Error> {
        let path = String::deserialize(deserializer)?;
        Ok((!path.trim().is_empty()).then(|| PathBuf::from(path)))
    }
}
