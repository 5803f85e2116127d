//! Core data types shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::PipelineError;

/// A vocabulary term paired with its cosine similarity to an image.
///
/// Serialized as a two-element array `["term", score]` in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f32)", into = "(String, f32)")]
pub struct ScoredKeyword {
    /// The vocabulary term
    pub term: String,

    /// Cosine similarity, nominally in [-1, 1]
    pub score: f32,
}

impl ScoredKeyword {
    pub fn new(term: impl Into<String>, score: f32) -> Self {
        Self {
            term: term.into(),
            score,
        }
    }
}

impl From<(String, f32)> for ScoredKeyword {
    fn from((term, score): (String, f32)) -> Self {
        Self { term, score }
    }
}

impl From<ScoredKeyword> for (String, f32) {
    fn from(kw: ScoredKeyword) -> Self {
        (kw.term, kw.score)
    }
}

/// One image as enumerated by a catalog source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Catalog-local identifier
    pub id: i64,

    /// Absolute path to the image file
    pub path: PathBuf,
}

impl ImageRecord {
    pub fn new(id: i64, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

/// What happened to the sidecar of a tagged image.
#[derive(Debug, Clone)]
pub struct SidecarSummary {
    /// Path of the `.xmp` file
    pub path: PathBuf,

    /// Keywords new to the sidecar in this run
    pub added: usize,

    /// Keywords in the sidecar after the merge
    pub total: usize,

    /// False in dry-run mode
    pub written: bool,
}

/// Final outcome of processing one image.
#[derive(Debug)]
pub enum ImageOutcome {
    /// At least one keyword passed the threshold and was merged.
    Tagged {
        keywords: Vec<ScoredKeyword>,
        sidecar: SidecarSummary,
    },

    /// The image decoded and embedded fine but no term passed the threshold.
    NoMatches,

    /// Embedding failed; the image degrades to zero suggestions.
    EmbeddingFailed { message: String },

    /// Keywords were ranked but the sidecar could not be read or written.
    /// The keywords still belong in the report.
    SidecarFailed {
        keywords: Vec<ScoredKeyword>,
        error: PipelineError,
    },

    /// Validation or decode failure.
    Failed { error: PipelineError },
}

impl ImageOutcome {
    /// Keywords suggested for this image (empty unless ranking produced some).
    pub fn keywords(&self) -> &[ScoredKeyword] {
        match self {
            ImageOutcome::Tagged { keywords, .. }
            | ImageOutcome::SidecarFailed { keywords, .. } => keywords,
            _ => &[],
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ImageOutcome::Failed { .. } | ImageOutcome::SidecarFailed { .. }
        )
    }
}

/// Per-image entry of a processing run, in catalog order.
#[derive(Debug)]
pub struct ImageReport {
    pub record: ImageRecord,
    pub outcome: ImageOutcome,
}

/// Processing statistics for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessingStats {
    /// Images that received at least one keyword
    pub tagged: usize,

    /// Images with no keyword above the threshold
    pub no_matches: usize,

    /// Images whose embedding failed (zero suggestions)
    pub degraded: usize,

    /// Images that failed to decode or whose sidecar failed
    pub failed: usize,

    /// Images not attempted because the run was stopped
    pub skipped: usize,

    /// Keywords newly added across all sidecars
    pub keywords_added: usize,

    /// Processing rate in images per second
    pub images_per_second: f64,

    /// Total processing time in seconds
    pub total_seconds: f64,
}

impl ProcessingStats {
    /// Images that completed without a hard failure.
    pub fn succeeded(&self) -> usize {
        self.tagged + self.no_matches + self.degraded
    }

    /// Images that were attempted.
    pub fn processed(&self) -> usize {
        self.succeeded() + self.failed
    }

    pub(crate) fn record(&mut self, outcome: &ImageOutcome) {
        match outcome {
            ImageOutcome::Tagged { sidecar, .. } => {
                self.tagged += 1;
                self.keywords_added += sidecar.added;
            }
            ImageOutcome::NoMatches => self.no_matches += 1,
            ImageOutcome::EmbeddingFailed { .. } => self.degraded += 1,
            ImageOutcome::Failed { .. } | ImageOutcome::SidecarFailed { .. } => {
                self.failed += 1
            }
        }
    }
}

/// Everything a run produced: per-image outcomes plus aggregate stats.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub images: Vec<ImageReport>,
    pub stats: ProcessingStats,

    /// True when the run halted early on a stop signal
    pub stopped: bool,
}

impl ProcessingResult {
    /// Images with ranked keywords, in catalog order. Includes images whose
    /// sidecar update failed.
    pub fn suggestions(&self) -> impl Iterator<Item = (&PathBuf, &[ScoredKeyword])> {
        self.images
            .iter()
            .filter(|r| !r.outcome.keywords().is_empty())
            .map(|r| (&r.record.path, r.outcome.keywords()))
    }

    /// Images that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &PipelineError)> {
        self.images.iter().filter_map(|r| match &r.outcome {
            ImageOutcome::Failed { error } | ImageOutcome::SidecarFailed { error, .. } => {
                Some((&r.record.path, error))
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_keyword_serializes_as_pair() {
        let kw = ScoredKeyword::new("sunset", 0.75);
        let json = serde_json::to_string(&kw).unwrap();
        assert_eq!(json, "[\"sunset\",0.75]");

        let parsed: ScoredKeyword = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, kw);
    }

    #[test]
    fn test_stats_record_outcomes() {
        let mut stats = ProcessingStats::default();
        stats.record(&ImageOutcome::Tagged {
            keywords: vec![ScoredKeyword::new("lake", 0.6)],
            sidecar: SidecarSummary {
                path: PathBuf::from("a.xmp"),
                added: 1,
                total: 3,
                written: true,
            },
        });
        stats.record(&ImageOutcome::NoMatches);
        stats.record(&ImageOutcome::EmbeddingFailed {
            message: "boom".to_string(),
        });
        stats.record(&ImageOutcome::Failed {
            error: PipelineError::FileNotFound(PathBuf::from("b.jpg")),
        });

        assert_eq!(stats.tagged, 1);
        assert_eq!(stats.keywords_added, 1);
        assert_eq!(stats.succeeded(), 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed(), 4);
    }

    #[test]
    fn test_result_suggestions_skip_untagged() {
        let result = ProcessingResult {
            images: vec![
                ImageReport {
                    record: ImageRecord::new(1, "/p/a.jpg"),
                    outcome: ImageOutcome::NoMatches,
                },
                ImageReport {
                    record: ImageRecord::new(2, "/p/b.jpg"),
                    outcome: ImageOutcome::Tagged {
                        keywords: vec![ScoredKeyword::new("lake", 0.6)],
                        sidecar: SidecarSummary {
                            path: PathBuf::from("/p/b.xmp"),
                            added: 1,
                            total: 1,
                            written: true,
                        },
                    },
                },
            ],
            ..Default::default()
        };

        let suggestions: Vec<_> = result.suggestions().collect();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].0, &PathBuf::from("/p/b.jpg"));
    }

    #[test]
    fn test_sidecar_failure_keeps_keywords_but_counts_as_failed() {
        let result = ProcessingResult {
            images: vec![ImageReport {
                record: ImageRecord::new(1, "/p/a.jpg"),
                outcome: ImageOutcome::SidecarFailed {
                    keywords: vec![ScoredKeyword::new("lake", 0.6)],
                    error: PipelineError::SidecarWrite {
                        path: PathBuf::from("/p/a.xmp"),
                        message: "read-only".to_string(),
                    },
                },
            }],
            ..Default::default()
        };

        let suggestions: Vec<_> = result.suggestions().collect();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].1[0].term, "lake");
        assert_eq!(result.failures().count(), 1);
        assert!(result.images[0].outcome.is_failure());

        let mut stats = ProcessingStats::default();
        stats.record(&result.images[0].outcome);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.tagged, 0);
        assert_eq!(stats.keywords_added, 0);
    }
}
