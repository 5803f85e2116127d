//! Image folders as a catalog.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::CatalogError;
use crate::types::ImageRecord;

use super::ImageSource;

/// Every supported image below a directory, in path order.
pub struct FolderCatalog {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FolderCatalog {
    /// Scan `root` for files whose extension is in `extensions` (any case).
    pub fn new(root: &Path, extensions: &[String]) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::NotFound(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        })
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }
}

impl ImageSource for FolderCatalog {
    fn images(&self) -> Result<Vec<ImageRecord>, CatalogError> {
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        paths.sort();
        tracing::info!("Found {} images in {:?}", paths.len(), self.root);

        Ok(paths
            .into_iter()
            .zip(1..)
            .map(|(path, id)| ImageRecord::new(id, path))
            .collect())
    }
}
