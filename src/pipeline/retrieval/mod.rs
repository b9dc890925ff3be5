pub mod search;

pub use search::*;

use thiserror::Error;

use crate::pipeline::storage::StorageError;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Query embedding failed for {system}: {source}")]
    QueryEmbedding {
        system: String,
        #[source]
        source: StorageError,
    },
}
