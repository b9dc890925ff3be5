use super::index::CodeIndex;
use super::StorageError;
use crate::models::CodeSystem;

/// Embedding model abstraction
pub trait EmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError>;
    fn dimension(&self) -> usize;

    /// Identity of the model behind the vectors. Indices built by another
    /// model are not comparable.
    fn model_id(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Allow `Box<dyn EmbeddingModel>` to be used as `&impl EmbeddingModel`.
impl EmbeddingModel for Box<dyn EmbeddingModel> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
        (**self).embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn model_id(&self) -> String {
        (**self).model_id()
    }
}

/// Persistence of built indices, one per code system.
///
/// `load` returns `Ok(None)` when nothing has been saved for the system yet;
/// callers keep an empty index in that case.
pub trait IndexStore {
    fn save(&self, index: &CodeIndex) -> Result<(), StorageError>;
    fn load(&self, system: CodeSystem) -> Result<Option<CodeIndex>, StorageError>;
}
