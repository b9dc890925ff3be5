pub mod columns;
pub mod loader;

pub use columns::*;
pub use loader::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogLoadError {
    #[error("Catalog file not found: {0}")]
    NotFound(PathBuf),

    #[error("Catalog file unreadable: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Catalog has no header columns: {0}")]
    NoColumns(PathBuf),

    #[error("Catalog has no data rows: {0}")]
    Empty(PathBuf),
}
