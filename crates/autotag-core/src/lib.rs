//! autotag core - embedding-based keyword suggestion for photo catalogs.
//!
//! Every image in a catalog is embedded with a CLIP-style model and compared
//! against a fixed keyword vocabulary. Keywords above a similarity threshold
//! are merged into the image's XMP sidecar, where Lightroom picks them up.
//!
//! # Architecture
//!
//! ```text
//! Catalog → Validate → Decode → Prepare → Embed → Rank (vs. vocabulary) → Merge XMP → Report
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use autotag_core::catalog::{ImageSource, LightroomCatalog};
//! use autotag_core::{CatalogPipeline, Config, OnnxEmbedder, RunOptions, StopSignal, Vocabulary};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let vocabulary = Vocabulary::load(&config.keywords_file())?;
//!     let embedder = Arc::new(OnnxEmbedder::load(&config.embedding, &config.model_dir())?);
//!     let records = LightroomCatalog::open("Catalog.lrcat".as_ref())?.images()?;
//!
//!     let mut pipeline = CatalogPipeline::new(&config, vocabulary, embedder);
//!     let result = pipeline
//!         .run(&records, RunOptions::default(), &StopSignal::new(), |_, _| {})
//!         .await?;
//!     println!("Tagged {} images", result.stats.tagged);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod math;
pub mod output;
pub mod pipeline;
pub mod sidecar;
pub mod tagging;
pub mod types;

pub use catalog::{FolderCatalog, ImageSource, LightroomCatalog};
pub use config::Config;
pub use embedding::{Embedder, OnnxEmbedder};
pub use error::{
    AutotagError, CatalogError, ConfigError, PipelineError, PipelineResult, Result,
    VocabularyError,
};
pub use output::ReportWriter;
pub use pipeline::{CatalogPipeline, RunOptions, StopSignal};
pub use sidecar::{MergeOutcome, SidecarWriter};
pub use tagging::{EmbeddingCache, KeywordRanker, TextEmbeddings, Vocabulary};
pub use types::{
    ImageOutcome, ImageRecord, ImageReport, ProcessingResult, ProcessingStats, ScoredKeyword,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
