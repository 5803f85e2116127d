//! Pre-computed vocabulary embeddings.
//!
//! The text side of every comparison is the same for all images, so the
//! vocabulary is encoded once and kept as a flat row-major matrix. The matrix
//! can also be persisted next to a `.meta` file so later runs skip encoding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::embedding::Embedder;
use crate::error::PipelineError;

use super::vocabulary::Vocabulary;

/// Flat `rows × dim` matrix of L2-normalized term embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEmbeddings {
    matrix: Vec<f32>,
    dim: usize,
    rows: usize,
}

impl TextEmbeddings {
    /// Build from per-term rows, normalizing each row.
    ///
    /// Rows must be non-empty and share one width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, PipelineError> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        if dim == 0 {
            return Err(embedding_error("embedder returned zero-width vectors"));
        }

        let mut matrix = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(embedding_error(format!(
                    "row {} has {} dims, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            matrix.extend_from_slice(row);
        }
        crate::math::normalize_rows(&mut matrix, dim);

        Ok(Self {
            matrix,
            dim,
            rows: rows.len(),
        })
    }

    /// Get the flat matrix.
    pub fn matrix(&self) -> &[f32] {
        &self.matrix
    }

    /// Get one term's embedding.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        (index < self.rows).then(|| &self.matrix[index * self.dim..(index + 1) * self.dim])
    }

    /// Embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of rows (one per vocabulary term).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Save as raw little-endian f32 with a `.meta` file for invalidation.
    pub fn save(&self, path: &Path, cache_key: &str) -> Result<(), PipelineError> {
        let bytes: Vec<u8> = self.matrix.iter().flat_map(|f| f.to_le_bytes()).collect();
        std::fs::write(path, &bytes).map_err(|e| PipelineError::Model {
            message: format!("Failed to save embeddings to {:?}: {}", path, e),
        })?;

        let meta_path = path.with_extension("meta");
        let meta = format!(
            "vocab_hash={}\nrows={}\ndim={}\n",
            cache_key, self.rows, self.dim
        );
        std::fs::write(&meta_path, meta).map_err(|e| PipelineError::Model {
            message: format!("Failed to save embedding metadata to {:?}: {}", meta_path, e),
        })?;

        tracing::info!(
            "Saved vocabulary embeddings to {:?} ({:.1} MB)",
            path,
            bytes.len() as f64 / 1_000_000.0
        );
        Ok(())
    }

    /// Load a persisted matrix if its metadata matches `cache_key` and `rows`.
    ///
    /// Returns `None` on any mismatch or read problem; the caller recomputes.
    pub fn load_cached(path: &Path, cache_key: &str, rows: usize) -> Option<Self> {
        let meta = std::fs::read_to_string(path.with_extension("meta")).ok()?;
        let field = |name: &str| {
            meta.lines()
                .find_map(|line| line.strip_prefix(name)?.strip_prefix('='))
                .map(str::to_string)
        };

        if field("vocab_hash")? != cache_key {
            return None;
        }
        let meta_rows: usize = field("rows")?.parse().ok()?;
        let dim: usize = field("dim")?.parse().ok()?;
        if meta_rows != rows || dim == 0 {
            return None;
        }

        let bytes = std::fs::read(path).ok()?;
        if bytes.len() != rows * dim * 4 {
            tracing::warn!("Embedding cache {:?} has unexpected size, ignoring", path);
            return None;
        }

        let matrix = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        tracing::info!("Loaded vocabulary embeddings: {} terms from {:?}", rows, path);
        Some(Self { matrix, dim, rows })
    }
}

/// Lazily computed, process-lifetime vocabulary embeddings.
///
/// Initialization takes `&mut self`, so a first-use race is impossible; once
/// computed, the matrix is only handed out behind shared references.
pub struct EmbeddingCache {
    embeddings: Option<Arc<TextEmbeddings>>,
    config: EmbeddingConfig,
    cache_dir: Option<PathBuf>,
}

impl EmbeddingCache {
    /// Create an empty cache with the given prompt settings and optional
    /// persistence directory.
    pub fn new(config: &EmbeddingConfig, cache_dir: Option<PathBuf>) -> Self {
        Self {
            embeddings: None,
            config: config.clone(),
            cache_dir,
        }
    }

    /// In-memory only cache with the raw-term prompt.
    pub fn in_memory() -> Self {
        Self::new(&EmbeddingConfig::default(), None)
    }

    /// Whether the matrix has been computed.
    pub fn is_ready(&self) -> bool {
        self.embeddings.is_some()
    }

    /// The matrix, if already computed.
    pub fn get(&self) -> Option<&TextEmbeddings> {
        self.embeddings.as_deref()
    }

    /// A handle to the matrix for use on other threads, if already computed.
    pub fn shared(&self) -> Option<Arc<TextEmbeddings>> {
        self.embeddings.clone()
    }

    /// Return the vocabulary embeddings, computing them on first call.
    ///
    /// Later calls return the same matrix without touching the embedder.
    pub fn get_text_embeddings(
        &mut self,
        vocabulary: &Vocabulary,
        embedder: &dyn Embedder,
    ) -> Result<&TextEmbeddings, PipelineError> {
        if self.embeddings.is_none() {
            let computed = self.load_or_compute(vocabulary, embedder)?;
            self.embeddings = Some(Arc::new(computed));
        }
        self.embeddings
            .as_deref()
            .ok_or_else(|| embedding_error("vocabulary embeddings unavailable"))
    }

    fn load_or_compute(
        &self,
        vocabulary: &Vocabulary,
        embedder: &dyn Embedder,
    ) -> Result<TextEmbeddings, PipelineError> {
        let cache_key = self.cache_key(vocabulary, embedder);
        let cache_path = self
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.bin", &cache_key[..16])));

        if let Some(path) = &cache_path {
            if let Some(cached) = TextEmbeddings::load_cached(path, &cache_key, vocabulary.len()) {
                return Ok(cached);
            }
        }

        let computed = self.compute(vocabulary, embedder)?;

        if let Some(path) = &cache_path {
            let saved = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .map_err(|e| PipelineError::Model {
                    message: format!("Failed to create cache dir: {e}"),
                })
                .and_then(|()| computed.save(path, &cache_key));
            if let Err(e) = saved {
                tracing::warn!("Could not persist vocabulary embeddings: {e}");
            }
        }

        Ok(computed)
    }

    fn compute(
        &self,
        vocabulary: &Vocabulary,
        embedder: &dyn Embedder,
    ) -> Result<TextEmbeddings, PipelineError> {
        tracing::info!(
            "Encoding {} vocabulary terms (first run only)...",
            vocabulary.len()
        );

        let prompts: Vec<String> = vocabulary
            .terms()
            .iter()
            .map(|t| self.config.prompt_for(t))
            .collect();

        let rows = embedder.embed_text(&prompts)?;
        if rows.len() != vocabulary.len() {
            return Err(embedding_error(format!(
                "embedder returned {} rows for {} vocabulary terms",
                rows.len(),
                vocabulary.len()
            )));
        }

        let embeddings = TextEmbeddings::from_rows(rows)?;
        tracing::info!(
            "Vocabulary embeddings ready: {} terms x {} dims ({:.1} MB)",
            embeddings.rows(),
            embeddings.dim(),
            (embeddings.rows() * embeddings.dim() * 4) as f64 / 1_000_000.0
        );
        Ok(embeddings)
    }

    /// Vocabulary, prompt and model all change what the matrix holds.
    fn cache_key(&self, vocabulary: &Vocabulary, embedder: &dyn Embedder) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(vocabulary.content_hash().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.config.prompt_template.as_bytes());
        hasher.update(b"\0");
        hasher.update(embedder.model_id().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

fn embedding_error(message: impl Into<String>) -> PipelineError {
    PipelineError::Embedding {
        path: PathBuf::from("<vocabulary>"),
        message: message.into(),
    }
}
