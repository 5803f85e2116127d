//! Catalog processing: rank every image and merge its keywords into the sidecar.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::sidecar::{sidecar_path, SidecarWriter};
use crate::tagging::{EmbeddingCache, KeywordRanker, TextEmbeddings, Vocabulary};
use crate::types::{
    ImageOutcome, ImageRecord, ImageReport, ProcessingResult, ScoredKeyword, SidecarSummary,
};

use super::decode::ImageDecoder;
use super::stop::StopSignal;
use super::validate::Validator;

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Replace each sidecar's keywords instead of adding to them
    pub overwrite: bool,
    /// Rank and merge in memory without writing sidecars
    pub dry_run: bool,
}

/// Sequential tagging pipeline over a list of catalog images.
pub struct CatalogPipeline {
    validator: Validator,
    decoder: ImageDecoder,
    ranker: KeywordRanker,
    sidecars: SidecarWriter,
    vocabulary: Arc<Vocabulary>,
    embedder: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    embed_timeout: Duration,
}

impl CatalogPipeline {
    pub fn new(config: &Config, vocabulary: Vocabulary, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            validator: Validator::new(config.limits.clone()),
            decoder: ImageDecoder::new(config.limits.clone()),
            ranker: KeywordRanker::new(config.ranking.clone()),
            sidecars: SidecarWriter::new(),
            vocabulary: Arc::new(vocabulary),
            embedder,
            cache: EmbeddingCache::new(&config.embedding, config.cache_dir()),
            embed_timeout: Duration::from_millis(config.limits.embed_timeout_ms),
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Compute (or load) the vocabulary embeddings up front.
    ///
    /// Failure here is fatal: nothing can be ranked without them.
    pub fn warm(&mut self) -> Result<Arc<TextEmbeddings>, PipelineError> {
        self.cache
            .get_text_embeddings(&self.vocabulary, self.embedder.as_ref())?;
        self.cache.shared().ok_or_else(|| PipelineError::Model {
            message: "vocabulary embeddings unavailable after warm-up".to_string(),
        })
    }

    /// Process `records` in order.
    ///
    /// Per-image failures are recorded and never abort the batch. The stop
    /// signal is checked before each image; images not started are counted
    /// as skipped.
    pub async fn run<F>(
        &mut self,
        records: &[ImageRecord],
        options: RunOptions,
        stop: &StopSignal,
        mut progress: F,
    ) -> Result<ProcessingResult, PipelineError>
    where
        F: FnMut(&ImageRecord, &ImageOutcome),
    {
        let embeddings = self.warm()?;
        let start = Instant::now();
        let mut result = ProcessingResult::default();

        if options.dry_run {
            tracing::info!("Dry run: sidecars will not be written");
        }

        for (index, record) in records.iter().enumerate() {
            if stop.is_stopped() {
                result.stopped = true;
                result.stats.skipped = records.len() - index;
                tracing::warn!(
                    "Stopped after {} of {} images",
                    index,
                    records.len()
                );
                break;
            }

            let outcome = self.process_one(record, &embeddings, options).await;
            progress(record, &outcome);
            result.stats.record(&outcome);
            result.images.push(ImageReport {
                record: record.clone(),
                outcome,
            });
        }

        let elapsed = start.elapsed().as_secs_f64();
        result.stats.total_seconds = elapsed;
        result.stats.images_per_second = if elapsed > 0.0 {
            result.stats.processed() as f64 / elapsed
        } else {
            0.0
        };

        tracing::info!(
            "Processed {} images: {} tagged, {} without matches, {} degraded, {} failed",
            result.stats.processed(),
            result.stats.tagged,
            result.stats.no_matches,
            result.stats.degraded,
            result.stats.failed
        );
        Ok(result)
    }

    async fn process_one(
        &self,
        record: &ImageRecord,
        embeddings: &Arc<TextEmbeddings>,
        options: RunOptions,
    ) -> ImageOutcome {
        tracing::debug!("Processing #{}: {:?}", record.id, record.path);

        match self.try_process(&record.path, embeddings, options).await {
            Ok(outcome) => {
                match &outcome {
                    ImageOutcome::Tagged { keywords, sidecar } => tracing::info!(
                        "{:?}: {} keywords ({} new)",
                        record.path,
                        keywords.len(),
                        sidecar.added
                    ),
                    ImageOutcome::SidecarFailed { keywords, error } => tracing::error!(
                        "{} ({} ranked keywords kept for the report)",
                        error,
                        keywords.len()
                    ),
                    _ => tracing::debug!("{:?}: no keywords above threshold", record.path),
                }
                outcome
            }
            Err(e) if e.is_degradable() => {
                tracing::warn!("{}", e);
                ImageOutcome::EmbeddingFailed {
                    message: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!("{}", e);
                ImageOutcome::Failed { error: e }
            }
        }
    }

    async fn try_process(
        &self,
        path: &Path,
        embeddings: &Arc<TextEmbeddings>,
        options: RunOptions,
    ) -> Result<ImageOutcome, PipelineError> {
        self.validator.validate(path)?;
        let image = self.decoder.decode(path).await?;

        let keywords = self.rank(image, path, embeddings).await?;
        if keywords.is_empty() {
            return Ok(ImageOutcome::NoMatches);
        }

        let update = self.sidecars.update(
            path,
            keywords.iter().map(|k| k.term.as_str()),
            options.overwrite,
            options.dry_run,
        );
        let merged = match update {
            Ok(merged) => merged,
            Err(error) => return Ok(ImageOutcome::SidecarFailed { keywords, error }),
        };

        Ok(ImageOutcome::Tagged {
            keywords,
            sidecar: SidecarSummary {
                path: sidecar_path(path),
                added: merged.added,
                total: merged.total,
                written: !options.dry_run,
            },
        })
    }

    /// Prepare, embed and score on the blocking pool, bounded by `embed_timeout_ms`.
    ///
    /// A blocking task cannot be cancelled, so after a timeout the abandoned
    /// inference is awaited before returning. The next image then starts with
    /// the model free instead of queueing on its lock.
    async fn rank(
        &self,
        image: image::DynamicImage,
        path: &Path,
        embeddings: &Arc<TextEmbeddings>,
    ) -> Result<Vec<ScoredKeyword>, PipelineError> {
        let ranker = self.ranker.clone();
        let vocabulary = Arc::clone(&self.vocabulary);
        let embeddings = Arc::clone(embeddings);
        let embedder = Arc::clone(&self.embedder);
        let owned = path.to_path_buf();

        let mut task = tokio::task::spawn_blocking(move || {
            ranker.try_rank(image, &vocabulary, &embeddings, embedder.as_ref(), &owned)
        });

        let embedding_error = |message: String| PipelineError::Embedding {
            path: path.to_path_buf(),
            message,
        };
        match timeout(self.embed_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(embedding_error(format!("Embedding task failed: {e}"))),
            Err(_) => {
                tracing::warn!(
                    "Embedding {:?} exceeded {}ms, waiting for the model to finish",
                    path,
                    self.embed_timeout.as_millis()
                );
                let _ = task.await;
                Err(embedding_error(format!(
                    "Embedding timed out after {}ms",
                    self.embed_timeout.as_millis()
                )))
            }
        }
    }
}
