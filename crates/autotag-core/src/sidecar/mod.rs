//! XMP sidecar reading, keyword merging and atomic writing.
//!
//! Lightroom reads keywords for raw files from a `.xmp` file next to the
//! image. [`merge`] is the pure part; [`SidecarWriter`] adds the file I/O.

pub mod document;
pub mod merge;
pub mod schema;

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

pub use merge::{merge, read_keywords, MergeOutcome};

/// Path of the sidecar for an image: the extension replaced by `xmp`.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension("xmp")
}

/// Reads, merges and atomically rewrites sidecars.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarWriter;

impl SidecarWriter {
    pub fn new() -> Self {
        Self
    }

    /// Merge `keywords` into the sidecar of `image_path`.
    ///
    /// In `dry_run` mode the outcome is computed but nothing is written.
    pub fn update<I, S>(
        &self,
        image_path: &Path,
        keywords: I,
        overwrite: bool,
        dry_run: bool,
    ) -> Result<MergeOutcome, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = sidecar_path(image_path);
        let existing = Self::read(&path)?;

        let outcome = merge(existing.as_deref(), keywords, overwrite);
        if let Some(reason) = &outcome.rebuilt {
            tracing::warn!(
                "Sidecar {:?} is not valid XMP ({}), rebuilding keyword metadata",
                path,
                reason
            );
        }

        if dry_run {
            tracing::debug!(
                "Dry run: would write {} keywords ({} new) to {:?}",
                outcome.total,
                outcome.added,
                path
            );
            return Ok(outcome);
        }

        Self::write_atomic(&path, &outcome.bytes)?;
        tracing::debug!(
            "Wrote {} keywords ({} new) to {:?}",
            outcome.total,
            outcome.added,
            path
        );
        Ok(outcome)
    }

    /// Read a sidecar; a missing file is `None`.
    pub fn read(path: &Path) -> Result<Option<Vec<u8>>, PipelineError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::SidecarRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Write through a temp file in the same directory, then rename over `path`.
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
        let write_error = |message: String| PipelineError::SidecarWrite {
            path: path.to_path_buf(),
            message,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| write_error(format!("Failed to create temp file: {e}")))?;
        file.write_all(bytes)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| write_error(e.to_string()))?;
        file.persist(path)
            .map_err(|e| write_error(e.error.to_string()))?;
        Ok(())
    }
}
