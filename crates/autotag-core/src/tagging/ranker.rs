//! Flat brute-force ranking of an image embedding against the vocabulary.
//!
//! Both sides are L2-normalized, so the matrix-vector product yields cosine
//! similarities directly. Scores above the threshold are sorted and capped.

use std::path::Path;

use image::{DynamicImage, GenericImageView};
use ndarray::{ArrayView1, ArrayView2};

use crate::config::RankingConfig;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::types::ScoredKeyword;

use super::cache::TextEmbeddings;
use super::vocabulary::Vocabulary;

/// Turns images into ranked keyword suggestions.
#[derive(Debug, Clone)]
pub struct KeywordRanker {
    config: RankingConfig,
}

impl KeywordRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Flatten transparency and cap the longest side at `max_image_dimension`.
    pub fn prepare(&self, image: DynamicImage) -> DynamicImage {
        let image = if image.color().has_alpha() {
            DynamicImage::ImageRgb8(image.to_rgb8())
        } else {
            image
        };

        let cap = self.config.max_image_dimension;
        let (width, height) = image.dimensions();
        let longest = width.max(height);
        if cap == 0 || longest <= cap {
            return image;
        }

        let scale = |d: u32| ((d as u64 * cap as u64) / longest as u64).max(1) as u32;
        image.resize_exact(
            scale(width),
            scale(height),
            image::imageops::FilterType::Lanczos3,
        )
    }

    /// Score an image embedding against every vocabulary term.
    ///
    /// Keeps scores strictly above the threshold, sorted descending with ties
    /// in vocabulary order, truncated to `max_keywords`.
    pub fn score(
        &self,
        image_embedding: &[f32],
        vocabulary: &Vocabulary,
        embeddings: &TextEmbeddings,
    ) -> Result<Vec<ScoredKeyword>, PipelineError> {
        let dim = embeddings.dim();
        if image_embedding.len() != dim {
            return Err(PipelineError::Embedding {
                path: Default::default(),
                message: format!(
                    "image embedding has {} dims, vocabulary embeddings have {}",
                    image_embedding.len(),
                    dim
                ),
            });
        }

        let mut image = image_embedding.to_vec();
        crate::math::l2_normalize_in_place(&mut image);
        let matrix = ArrayView2::from_shape((embeddings.rows(), dim), embeddings.matrix())
            .map_err(|e| PipelineError::Embedding {
                path: Default::default(),
                message: format!("malformed embedding matrix: {e}"),
            })?;
        let similarities = matrix.dot(&ArrayView1::from(&image[..]));

        let mut keywords: Vec<ScoredKeyword> = similarities
            .iter()
            .enumerate()
            .filter(|(_, &score)| score > self.config.threshold)
            .filter_map(|(i, &score)| {
                vocabulary
                    .get(i)
                    .map(|term| ScoredKeyword::new(term, score))
            })
            .collect();

        keywords.sort_by(|a, b| b.score.total_cmp(&a.score));
        keywords.truncate(self.config.max_keywords);
        Ok(keywords)
    }

    /// Prepare, embed and score one image.
    pub fn try_rank(
        &self,
        image: DynamicImage,
        vocabulary: &Vocabulary,
        embeddings: &TextEmbeddings,
        embedder: &dyn Embedder,
        path: &Path,
    ) -> Result<Vec<ScoredKeyword>, PipelineError> {
        let prepared = self.prepare(image);
        let with_path = |e: PipelineError| match e {
            PipelineError::Embedding { message, .. } => PipelineError::Embedding {
                path: path.to_path_buf(),
                message,
            },
            PipelineError::Model { message } => PipelineError::Embedding {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        };

        let vector = embedder.embed_image(&prepared).map_err(with_path)?;
        self.score(&vector, vocabulary, embeddings).map_err(with_path)
    }

    /// Like [`try_rank`](Self::try_rank), but embedding failures become an
    /// empty suggestion list.
    pub fn rank(
        &self,
        image: DynamicImage,
        vocabulary: &Vocabulary,
        embeddings: &TextEmbeddings,
        embedder: &dyn Embedder,
        path: &Path,
    ) -> Vec<ScoredKeyword> {
        match self.try_rank(image, vocabulary, embeddings, embedder, path) {
            Ok(keywords) => keywords,
            Err(e) => {
                tracing::warn!("No keywords for {:?}: {}", path, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{RgbImage, RgbaImage};

    /// Unit rows whose first component is the wanted cosine against e1.
    fn embeddings_for(scores: &[f32]) -> TextEmbeddings {
        TextEmbeddings::from_rows(
            scores
                .iter()
                .map(|&s| vec![s, (1.0 - s * s).sqrt(), 0.0])
                .collect(),
        )
        .unwrap()
    }

    fn ranker(threshold: f32, max_keywords: usize) -> KeywordRanker {
        KeywordRanker::new(RankingConfig {
            threshold,
            max_keywords,
            ..Default::default()
        })
    }

    fn terms(keywords: &[ScoredKeyword]) -> Vec<&str> {
        keywords.iter().map(|k| k.term.as_str()).collect()
    }

    // Vocabulary sorts to [lake, mountain, sunset].
    fn landscape() -> (Vocabulary, TextEmbeddings) {
        let vocab = Vocabulary::from_terms(["mountain", "lake", "sunset"]).unwrap();
        (vocab, embeddings_for(&[0.30, 0.62, 0.71]))
    }

    #[test]
    fn test_threshold_and_cap() {
        let (vocab, emb) = landscape();
        let result = ranker(0.5, 2).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
        assert_eq!(terms(&result), vec!["sunset", "mountain"]);
        assert!((result[0].score - 0.71).abs() < 1e-4);
        assert!((result[1].score - 0.62).abs() < 1e-4);
    }

    #[test]
    fn test_threshold_is_strict() {
        let vocab = Vocabulary::from_terms(["a", "b"]).unwrap();
        let emb = TextEmbeddings::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let result = ranker(1.0, 10).score(&[1.0, 0.0], &vocab, &emb).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_every_score_above_threshold() {
        let (vocab, emb) = landscape();
        for threshold in [-1.0, 0.0, 0.3, 0.5, 0.7] {
            let result = ranker(threshold, 20).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
            assert!(result.iter().all(|k| k.score > threshold));
        }
    }

    #[test]
    fn test_lower_threshold_is_superset() {
        let (vocab, emb) = landscape();
        let high = ranker(0.6, 20).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
        let low = ranker(0.2, 20).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
        assert!(terms(&high).iter().all(|t| terms(&low).contains(t)));
        assert_eq!(low.len(), 3);
    }

    #[test]
    fn test_smaller_cap_is_prefix() {
        let (vocab, emb) = landscape();
        let full = ranker(0.0, 20).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
        for cap in 0..=3 {
            let capped = ranker(0.0, cap).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
            assert!(capped.len() <= cap);
            assert_eq!(capped, full[..capped.len()]);
        }
    }

    #[test]
    fn test_ties_keep_vocabulary_order() {
        let vocab = Vocabulary::from_terms(["beta", "alpha", "gamma"]).unwrap();
        let emb = embeddings_for(&[0.8, 0.8, 0.8]);
        let result = ranker(0.5, 2).score(&[1.0, 0.0, 0.0], &vocab, &emb).unwrap();
        assert_eq!(terms(&result), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_image_vector_is_normalized() {
        let (vocab, emb) = landscape();
        let result = ranker(0.5, 2).score(&[5.0, 0.0, 0.0], &vocab, &emb).unwrap();
        assert!((result[0].score - 0.71).abs() < 1e-4);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (vocab, emb) = landscape();
        let err = ranker(0.5, 2).score(&[1.0, 0.0], &vocab, &emb).unwrap_err();
        assert!(matches!(err, PipelineError::Embedding { .. }));
    }

    #[test]
    fn test_prepare_flattens_alpha() {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(10, 10));
        let prepared = ranker(0.5, 20).prepare(image);
        assert!(!prepared.color().has_alpha());
    }

    #[test]
    fn test_prepare_downscales_longest_side() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(3000, 2000));
        let prepared = ranker(0.5, 20).prepare(image);
        assert_eq!(prepared.dimensions(), (1024, 682));
    }

    #[test]
    fn test_prepare_keeps_small_images() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let prepared = ranker(0.5, 20).prepare(image);
        assert_eq!(prepared.dimensions(), (640, 480));
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed_image(&self, _: &DynamicImage) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::Embedding {
                path: Default::default(),
                message: "service unavailable".to_string(),
            })
        }
        fn embed_text(&self, _: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(vec![])
        }
        fn model_id(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_rank_degrades_embedding_failure() {
        let (vocab, emb) = landscape();
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let path = Path::new("/photos/a.jpg");

        let err = ranker(0.5, 2)
            .try_rank(image.clone(), &vocab, &emb, &FailingEmbedder, path)
            .unwrap_err();
        match err {
            PipelineError::Embedding { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }

        let keywords = ranker(0.5, 2).rank(image, &vocab, &emb, &FailingEmbedder, path);
        assert!(keywords.is_empty());
    }
}
