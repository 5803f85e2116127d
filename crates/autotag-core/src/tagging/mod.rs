//! Zero-shot keyword suggestion.
//!
//! Scores images against a vocabulary by comparing an image embedding with
//! pre-computed text embeddings of every term.

pub mod cache;
pub mod ranker;
pub mod vocabulary;

pub use cache::{EmbeddingCache, TextEmbeddings};
pub use ranker::KeywordRanker;
pub use vocabulary::Vocabulary;
