//! Image decoding with content sniffing and a timeout.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, ImageFormat};
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Decodes images on the blocking pool, bounded by `decode_timeout_ms`.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

impl ImageDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read and decode `path`. Every failure, including a timeout, is
    /// [`PipelineError::InvalidImage`].
    pub async fn decode(&self, path: &Path) -> Result<DynamicImage, PipelineError> {
        let owned: PathBuf = path.to_path_buf();
        let budget = Duration::from_millis(self.limits.decode_timeout_ms);

        let task = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&owned)
                .map_err(|e| invalid(&owned, format!("Cannot read file: {e}")))?;
            Self::decode_bytes(bytes, &owned)
        });

        match timeout(budget, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(invalid(path, format!("Decode task failed: {e}"))),
            Err(_) => Err(invalid(
                path,
                format!("Decode timed out after {}ms", self.limits.decode_timeout_ms),
            )),
        }
    }

    /// Decode in-memory bytes, sniffing the format from content first and
    /// falling back to the file extension.
    fn decode_bytes(bytes: Vec<u8>, path: &Path) -> Result<DynamicImage, PipelineError> {
        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| invalid(path, format!("Cannot detect image format: {e}")))?;

        if reader.format().is_none() {
            let format = ImageFormat::from_path(path)
                .map_err(|_| invalid(path, "Unsupported image format".to_string()))?;
            reader.set_format(format);
        }

        reader
            .decode()
            .map_err(|e| invalid(path, e.to_string()))
    }
}

fn invalid(path: &Path, message: String) -> PipelineError {
    PipelineError::InvalidImage {
        path: path.to_path_buf(),
        message,
    }
}
