//! Image and text embedding in a shared CLIP space.
//!
//! The pipeline only talks to the [`Embedder`] trait. [`OnnxEmbedder`] is the
//! production implementation: a CLIP dual encoder running locally via ONNX
//! Runtime. Tests substitute small deterministic embedders.
//!
//! # Usage
//!
//! ```rust,ignore
//! use autotag_core::embedding::{Embedder, OnnxEmbedder};
//! use autotag_core::Config;
//!
//! let config = Config::default();
//! let embedder = OnnxEmbedder::load(&config.embedding, &config.model_dir())?;
//! let vector = embedder.embed_image(&image)?;
//! ```

pub(crate) mod preprocess;
pub(crate) mod text;
pub(crate) mod vision;

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

use self::preprocess::preprocess;
use self::text::TextEncoder;
use self::vision::VisionEncoder;

/// Vision encoder ONNX filename.
pub const VISUAL_MODEL_FILENAME: &str = "visual.onnx";

/// Text encoder ONNX filename.
pub const TEXT_MODEL_FILENAME: &str = "text.onnx";

/// Tokenizer filename.
pub const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// A model that maps images and strings into one comparable vector space.
///
/// Both sides must use the same dimensionality. Returned vectors do not have
/// to be normalized; callers normalize before comparing.
pub trait Embedder: Send + Sync {
    /// Embed one decoded image.
    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError>;

    /// Embed a list of strings; row `i` belongs to `texts[i]`.
    fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Stable identifier of the model, used to key persisted embeddings.
    fn model_id(&self) -> &str;
}

/// CLIP dual encoder backed by ONNX Runtime.
pub struct OnnxEmbedder {
    vision: VisionEncoder,
    text: TextEncoder,
    image_size: u32,
    text_batch_size: usize,
    model_id: String,
}

impl OnnxEmbedder {
    /// Load both encoders from `{model_dir}/{model}/`.
    pub fn load(config: &EmbeddingConfig, model_dir: &Path) -> Result<Self, PipelineError> {
        let dir = Self::model_path(config, model_dir);
        for file in [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME] {
            if !dir.join(file).exists() {
                return Err(PipelineError::Model {
                    message: format!(
                        "{} not found in {:?}. Run `autotag models download` first.",
                        file, dir
                    ),
                });
            }
        }

        tracing::info!("Loading CLIP model from {:?}", dir);
        let vision = VisionEncoder::load(&dir.join(VISUAL_MODEL_FILENAME), &config.image_output)?;
        let text = TextEncoder::load(
            &dir.join(TEXT_MODEL_FILENAME),
            &dir.join(TOKENIZER_FILENAME),
            config.max_text_length,
            &config.text_output,
        )?;
        tracing::info!("CLIP model loaded successfully");

        Ok(Self {
            vision,
            text,
            image_size: config.image_size,
            text_batch_size: config.text_batch_size,
            model_id: format!("{}@{}", config.model, config.image_size),
        })
    }

    /// Check whether all model files exist on disk.
    pub fn model_exists(config: &EmbeddingConfig, model_dir: &Path) -> bool {
        let dir = Self::model_path(config, model_dir);
        [VISUAL_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME]
            .iter()
            .all(|f| dir.join(f).exists())
    }

    /// Get the directory holding this model's files.
    pub fn model_path(config: &EmbeddingConfig, model_dir: &Path) -> PathBuf {
        model_dir.join(&config.model)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
        let tensor = preprocess(image, self.image_size);
        self.vision.embed(&tensor, Path::new(""))
    }

    fn embed_text(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let mut rows = Vec::with_capacity(texts.len());
        for (batch_idx, chunk) in texts.chunks(self.text_batch_size).enumerate() {
            rows.extend(self.text.encode_batch(chunk)?);

            let encoded = (batch_idx + 1) * self.text_batch_size;
            if encoded % 2048 < self.text_batch_size || encoded >= texts.len() {
                tracing::info!("  Encoded {}/{} terms", encoded.min(texts.len()), texts.len());
            }
        }
        Ok(rows)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
