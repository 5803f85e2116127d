//! Cheap checks before an image is handed to the decoder.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Leading bytes of the container formats a catalog can hold.
///
/// Camera raw formats (NEF, DNG, CR2, ARW) are TIFF containers.
const SIGNATURES: &[(&str, usize, &[u8])] = &[
    ("jpeg", 0, &[0xFF, 0xD8, 0xFF]),
    ("png", 0, &[0x89, b'P', b'N', b'G']),
    ("gif", 0, b"GIF8"),
    ("tiff-le", 0, &[b'I', b'I', 0x2A, 0x00]),
    ("tiff-be", 0, &[b'M', b'M', 0x00, 0x2A]),
    ("webp", 8, b"WEBP"),
    ("bmp", 0, b"BM"),
    ("heif", 4, b"ftyp"),
];

/// Validates files before decoding.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Check existence, size limit and magic bytes.
    pub fn validate(&self, path: &Path) -> Result<(), PipelineError> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PipelineError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(invalid(path, format!("Cannot read metadata: {e}"))),
        };

        if !metadata.is_file() {
            return Err(invalid(path, "Not a regular file".to_string()));
        }

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let mut header = [0u8; 12];
        let read = std::fs::File::open(path)
            .and_then(|file| file.take(header.len() as u64).read(&mut header))
            .map_err(|e| invalid(path, format!("Cannot open file: {e}")))?;

        if read < 4 {
            return Err(invalid(path, "File too small to be a valid image".to_string()));
        }
        if Self::detect(&header[..read]).is_none() {
            return Err(invalid(
                path,
                "Unrecognized image format (invalid magic bytes)".to_string(),
            ));
        }

        Ok(())
    }

    /// Name of the container format the header belongs to.
    fn detect(header: &[u8]) -> Option<&'static str> {
        SIGNATURES
            .iter()
            .find(|(_, offset, magic)| {
                header
                    .get(*offset..*offset + magic.len())
                    .is_some_and(|bytes| bytes == *magic)
            })
            .map(|(name, _, _)| *name)
    }
}

fn invalid(path: &Path, message: String) -> PipelineError {
    PipelineError::InvalidImage {
        path: path.to_path_buf(),
        message,
    }
}
