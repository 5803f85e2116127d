//! Lightroom Classic catalog access.
//!
//! The catalog is a SQLite database. Full image paths are assembled from the
//! root folder, the folder path below it, and the file's base name and
//! extension. The database is opened read-only and never modified.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::error::CatalogError;
use crate::types::ImageRecord;

use super::ImageSource;

/// Files with these extensions (compared upper-cased) are tagged.
const IMAGES_SQL: &str = "
    SELECT f.id_local,
           rf.absolutePath || af.pathFromRoot || f.baseName || '.' || f.extension
    FROM AgLibraryFile f
    JOIN AgLibraryFolder af ON f.folder = af.id_local
    JOIN AgLibraryRootFolder rf ON af.rootFolder = rf.id_local
    WHERE UPPER(f.extension) IN ('NEF', 'JPG', 'JPEG', 'DNG', 'CR2', 'ARW')
    ORDER BY f.id_local ASC";

/// A read-only handle to a `.lrcat` file.
pub struct LightroomCatalog {
    path: PathBuf,
    conn: Connection,
}

impl LightroomCatalog {
    /// Open a catalog read-only.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if !path.is_file() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| CatalogError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Opened Lightroom catalog {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn query(&self) -> rusqlite::Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(IMAGES_SQL)?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let path: String = row.get(1)?;
            Ok(ImageRecord::new(id, path))
        })?;
        rows.collect()
    }
}

impl ImageSource for LightroomCatalog {
    fn images(&self) -> Result<Vec<ImageRecord>, CatalogError> {
        let images = self.query().map_err(|source| CatalogError::Query {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!("Found {} images in catalog {:?}", images.len(), self.path);
        Ok(images)
    }
}
