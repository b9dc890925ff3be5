pub mod types;
pub mod embedder;
pub mod index;
pub mod vectordb;

pub use types::*;
pub use embedder::*;
pub use index::*;
pub use vectordb::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Index serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt persisted index for {system}: {reason}")]
    CorruptIndex { system: String, reason: String },

    #[error("Embedding model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Embedding model initialization: {0}")]
    ModelInit(String),

    #[error("Tokenization error: {0}")]
    Tokenization(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Embedding service unreachable at {0}")]
    EmbeddingConnection(String),
}
