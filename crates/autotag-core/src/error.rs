//! Error types for the autotag pipeline.
//!
//! Startup errors (configuration, vocabulary, catalog) are fatal. Pipeline
//! errors are scoped to a single image and carry its path so a batch log is
//! enough to diagnose what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for autotag operations.
#[derive(Error, Debug)]
pub enum AutotagError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The keyword vocabulary could not be loaded
    #[error("Vocabulary error: {0}")]
    Vocabulary(#[from] VocabularyError),

    /// The image catalog could not be read
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Vocabulary loading errors. Always fatal: ranking without terms is meaningless.
#[derive(Error, Debug)]
pub enum VocabularyError {
    /// The vocabulary file could not be opened or read
    #[error("Failed to read vocabulary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Parsing produced zero usable terms
    #[error("Vocabulary {path} contains no usable terms")]
    Empty { path: PathBuf },
}

/// Catalog access errors. Always fatal: no image list means no work.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog file or image folder does not exist
    #[error("Catalog not found: {0}")]
    NotFound(PathBuf),

    /// The catalog database could not be opened
    #[error("Failed to open catalog {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The image query failed (unexpected schema, locked database, ...)
    #[error("Catalog query failed for {path}: {source}")]
    Query {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

/// Per-image pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The image could not be decoded (corrupt, unsupported, timed out)
    #[error("Invalid image {path}: {message}")]
    InvalidImage { path: PathBuf, message: String },

    /// Embedding generation failed or produced unusable vectors
    #[error("Embedding failed for {path}: {message}")]
    Embedding { path: PathBuf, message: String },

    /// Model files missing or the ONNX session could not be used
    #[error("Model error: {message}")]
    Model { message: String },

    /// An existing sidecar exists but could not be read
    #[error("Failed to read sidecar {path}: {message}")]
    SidecarRead { path: PathBuf, message: String },

    /// The merged sidecar could not be written
    #[error("Failed to write sidecar {path}: {message}")]
    SidecarWrite { path: PathBuf, message: String },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

impl PipelineError {
    /// Whether this error only degrades the image to "no suggestions"
    /// instead of failing it.
    pub fn is_degradable(&self) -> bool {
        matches!(self, PipelineError::Embedding { .. })
    }
}

/// Convenience type alias for autotag results.
pub type Result<T> = std::result::Result<T, AutotagError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_is_degradable() {
        let err = PipelineError::Embedding {
            path: PathBuf::from("a.jpg"),
            message: "timed out".to_string(),
        };
        assert!(err.is_degradable());

        let err = PipelineError::InvalidImage {
            path: PathBuf::from("a.jpg"),
            message: "bad header".to_string(),
        };
        assert!(!err.is_degradable());
    }

    #[test]
    fn test_error_messages_include_path() {
        let err = PipelineError::SidecarWrite {
            path: PathBuf::from("/photos/a.xmp"),
            message: "permission denied".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/photos/a.xmp"));
        assert!(msg.contains("permission denied"));
    }
}
