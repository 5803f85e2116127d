//! Where the list of images comes from.
//!
//! - **lightroom**: read-only query over a Lightroom Classic `.lrcat`
//! - **folder**: recursive scan of a directory

pub mod folder;
pub mod lightroom;

pub use folder::FolderCatalog;
pub use lightroom::LightroomCatalog;

use crate::error::CatalogError;
use crate::types::ImageRecord;

/// A source of image records in a stable order.
pub trait ImageSource {
    fn images(&self) -> Result<Vec<ImageRecord>, CatalogError>;
}
