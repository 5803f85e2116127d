//! Vocabulary loading for keyword suggestion.
//!
//! Reads a Lightroom-style keyword list: one term per line, `[Category]`
//! headers, tab indentation for hierarchy, and `{alias}` groups after a term.
//! Main terms and aliases are flattened into one sorted, deduplicated list.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::error::VocabularyError;

/// An immutable, sorted set of keyword terms.
///
/// Term `i` corresponds to row `i` of the text embedding matrix.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    terms: Vec<String>,
    by_term: HashMap<String, usize>,
}

impl Vocabulary {
    /// Load and normalize a vocabulary file.
    pub fn load(path: &Path) -> Result<Self, VocabularyError> {
        let content = std::fs::read_to_string(path).map_err(|source| VocabularyError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let vocabulary = Self::parse_from(&content, path)?;

        tracing::info!(
            "Loaded vocabulary: {} terms from {:?}",
            vocabulary.len(),
            path
        );
        Ok(vocabulary)
    }

    /// Parse vocabulary text that did not come from a file.
    pub fn parse(content: &str) -> Result<Self, VocabularyError> {
        Self::parse_from(content, Path::new("<inline>"))
    }

    fn parse_from(content: &str, origin: &Path) -> Result<Self, VocabularyError> {
        let mut set = BTreeSet::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('[') {
                continue;
            }

            if line.contains('{') {
                let mut segments = line.split('{');
                if let Some(main) = segments.next() {
                    set.insert(main.trim().to_string());
                }
                for alias in segments {
                    let alias = alias.trim_matches(|c: char| c == '}' || c.is_whitespace());
                    set.insert(alias.to_string());
                }
            } else {
                set.insert(line.to_string());
            }
        }

        set.remove("");

        if set.is_empty() {
            return Err(VocabularyError::Empty {
                path: PathBuf::from(origin),
            });
        }

        Ok(Self::from_sorted(set.into_iter().collect()))
    }

    /// Build a vocabulary from arbitrary terms (trimmed, deduplicated, sorted).
    pub fn from_terms<I, S>(terms: I) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if set.is_empty() {
            return Err(VocabularyError::Empty {
                path: PathBuf::from("<inline>"),
            });
        }

        Ok(Self::from_sorted(set.into_iter().collect()))
    }

    fn from_sorted(terms: Vec<String>) -> Self {
        let by_term = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self { terms, by_term }
    }

    /// All terms in sorted order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of terms in the vocabulary.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Always false for a loaded vocabulary; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Term at a given index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.terms.get(index).map(String::as_str)
    }

    /// Index of a term, if present.
    pub fn position(&self, term: &str) -> Option<usize> {
        self.by_term.get(term).copied()
    }

    /// Compute a BLAKE3 hash of all terms in order.
    ///
    /// Used for embedding cache invalidation: if the vocabulary changes,
    /// the hash changes and the cached matrix is rebuilt.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for term in &self.terms {
            hasher.update(term.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}
