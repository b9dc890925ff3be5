use super::types::EmbeddingModel;
use super::StorageError;
use crate::models::{CatalogEntry, CodeSystem};

/// Brute-force vector index over one code catalog.
///
/// `codes[i]`, `descriptions[i]` and `embeddings[i]` always describe the
/// same catalog row. Constructors enforce it.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeIndex {
    system: CodeSystem,
    codes: Vec<String>,
    descriptions: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    dimension: usize,
    catalog_fingerprint: Option<String>,
}

/// One row of a [`CodeIndex`], borrowed.
#[derive(Debug, Clone, Copy)]
pub struct IndexRow<'a> {
    pub position: usize,
    pub code: &'a str,
    pub description: &'a str,
    pub embedding: &'a [f32],
}

impl CodeIndex {
    /// An index with no rows. Searching it yields nothing.
    pub fn empty(system: CodeSystem) -> Self {
        Self {
            system,
            codes: Vec::new(),
            descriptions: Vec::new(),
            embeddings: Vec::new(),
            dimension: 0,
            catalog_fingerprint: None,
        }
    }

    /// Embed every catalog row as `"{code} {description}"`, `batch_size` rows at a time.
    pub fn build(
        system: CodeSystem,
        entries: &[CatalogEntry],
        embedder: &dyn EmbeddingModel,
        batch_size: usize,
    ) -> Result<Self, StorageError> {
        let batch_size = batch_size.max(1);
        let texts: Vec<String> = entries.iter().map(CatalogEntry::searchable_text).collect();
        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(entries.len());
        let mut dimension = 0usize;

        for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = embedder.embed_batch(&refs)?;

            if vectors.len() != refs.len() {
                return Err(StorageError::Embedding(format!(
                    "Batch {batch_no}: expected {} vectors, got {}",
                    refs.len(),
                    vectors.len()
                )));
            }

            for vector in vectors {
                if dimension == 0 {
                    dimension = vector.len();
                }
                if vector.len() != dimension {
                    return Err(StorageError::Embedding(format!(
                        "Inconsistent embedding dimension: {} vs {dimension}",
                        vector.len()
                    )));
                }
                embeddings.push(vector);
            }

            tracing::debug!(
                system = %system,
                batch = batch_no,
                embedded = embeddings.len(),
                total = entries.len(),
                "Embedded catalog batch"
            );
        }

        tracing::info!(
            system = %system,
            rows = entries.len(),
            dimension,
            "Code index built"
        );

        Ok(Self {
            system,
            codes: entries.iter().map(|e| e.code.clone()).collect(),
            descriptions: entries.iter().map(|e| e.description.clone()).collect(),
            embeddings,
            dimension,
            catalog_fingerprint: None,
        })
    }

    /// Reassemble an index from stored columns, checking alignment and dimension.
    pub fn from_parts(
        system: CodeSystem,
        codes: Vec<String>,
        descriptions: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        dimension: usize,
    ) -> Result<Self, StorageError> {
        let corrupt = |reason: String| StorageError::CorruptIndex {
            system: system.to_string(),
            reason,
        };

        if codes.len() != descriptions.len() || codes.len() != embeddings.len() {
            return Err(corrupt(format!(
                "misaligned columns: {} codes, {} descriptions, {} embeddings",
                codes.len(),
                descriptions.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimension) {
            return Err(corrupt(format!(
                "row {bad} has dimension {}, expected {dimension}",
                embeddings[bad].len()
            )));
        }

        Ok(Self {
            system,
            codes,
            descriptions,
            embeddings,
            dimension,
            catalog_fingerprint: None,
        })
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.catalog_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn system(&self) -> CodeSystem {
        self.system
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn descriptions(&self) -> &[String] {
        &self.descriptions
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn catalog_fingerprint(&self) -> Option<&str> {
        self.catalog_fingerprint.as_deref()
    }

    /// True when the index was built under this fingerprint
    /// (see [`index_fingerprint`]).
    pub fn is_current(&self, fingerprint: &str) -> bool {
        self.catalog_fingerprint.as_deref() == Some(fingerprint)
    }

    pub fn rows(&self) -> impl Iterator<Item = IndexRow<'_>> {
        self.codes
            .iter()
            .zip(&self.descriptions)
            .zip(&self.embeddings)
            .enumerate()
            .map(|(position, ((code, description), embedding))| IndexRow {
                position,
                code,
                description,
                embedding,
            })
    }
}

/// Freshness key of an index: the catalog fingerprint plus the identity and
/// dimension of the embedding model. A change to any of them means a rebuild.
pub fn index_fingerprint(catalog_fingerprint: &str, embedder: &dyn EmbeddingModel) -> String {
    format!(
        "{catalog_fingerprint}/{}/{}",
        embedder.model_id(),
        embedder.dimension()
    )
}

/// The ICD and CPT indices a run searches against.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeIndexSet {
    pub icd: CodeIndex,
    pub cpt: CodeIndex,
}

impl CodeIndexSet {
    pub fn new(icd: CodeIndex, cpt: CodeIndex) -> Self {
        Self { icd, cpt }
    }

    pub fn empty() -> Self {
        Self {
            icd: CodeIndex::empty(CodeSystem::Icd),
            cpt: CodeIndex::empty(CodeSystem::Cpt),
        }
    }

    pub fn get(&self, system: CodeSystem) -> &CodeIndex {
        match system {
            CodeSystem::Icd => &self.icd,
            CodeSystem::Cpt => &self.cpt,
        }
    }
}

impl Default for CodeIndexSet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::MockEmbedder;

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::new("K57.90", "Diverticulosis of intestine"),
            CatalogEntry::new("K64.8", "Other hemorrhoids"),
            CatalogEntry::new("K63.89", "Other specified diseases of intestine"),
        ]
    }

    /// Returns one vector fewer than asked.
    struct ShortEmbedder;

    impl EmbeddingModel for ShortEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, StorageError> {
            Ok(vec![1.0])
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            Ok(vec![vec![1.0]; texts.len().saturating_sub(1)])
        }
        fn dimension(&self) -> usize {
            1
        }
    }

    /// Dimension grows with every input.
    struct RaggedEmbedder;

    impl EmbeddingModel for RaggedEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, StorageError> {
            Ok(vec![1.0; text.len()])
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StorageError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }
        fn dimension(&self) -> usize {
            0
        }
    }

    #[test]
    fn build_keeps_rows_aligned() {
        let index = CodeIndex::build(CodeSystem::Icd, &catalog(), &MockEmbedder::new(), 2).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.codes(), &["K57.90", "K64.8", "K63.89"]);
        assert_eq!(index.descriptions()[1], "Other hemorrhoids");
        assert_eq!(index.embeddings().len(), 3);
        assert_eq!(index.dimension(), 384);

        let embedder = MockEmbedder::new();
        let expected = embedder.embed("K64.8 Other hemorrhoids").unwrap();
        assert_eq!(index.embeddings()[1], expected);
    }

    #[test]
    fn build_is_idempotent_across_batch_sizes() {
        let a = CodeIndex::build(CodeSystem::Cpt, &catalog(), &MockEmbedder::new(), 1).unwrap();
        let b = CodeIndex::build(CodeSystem::Cpt, &catalog(), &MockEmbedder::new(), 64).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn build_rejects_missing_vectors() {
        let err = CodeIndex::build(CodeSystem::Icd, &catalog(), &ShortEmbedder, 64).unwrap_err();
        assert!(matches!(err, StorageError::Embedding(_)));
    }

    #[test]
    fn build_rejects_inconsistent_dimension() {
        let err = CodeIndex::build(CodeSystem::Icd, &catalog(), &RaggedEmbedder, 64).unwrap_err();
        assert!(matches!(err, StorageError::Embedding(_)));
    }

    #[test]
    fn build_from_empty_catalog_is_empty() {
        let index = CodeIndex::build(CodeSystem::Icd, &[], &MockEmbedder::new(), 64).unwrap();
        assert!(index.is_empty());
        assert_eq!(index, CodeIndex::empty(CodeSystem::Icd));
    }

    #[test]
    fn from_parts_rejects_misalignment() {
        let err = CodeIndex::from_parts(
            CodeSystem::Icd,
            vec!["A".into(), "B".into()],
            vec!["a".into()],
            vec![vec![0.0], vec![1.0]],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::CorruptIndex { .. }));
    }

    #[test]
    fn from_parts_rejects_wrong_dimension() {
        let err = CodeIndex::from_parts(
            CodeSystem::Cpt,
            vec!["45378".into()],
            vec!["Colonoscopy".into()],
            vec![vec![0.0, 1.0]],
            3,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::CorruptIndex { .. }));
    }

    #[test]
    fn fingerprint_marks_index_current() {
        let index = CodeIndex::empty(CodeSystem::Icd).with_fingerprint("abc");
        assert!(index.is_current("abc"));
        assert!(!index.is_current("def"));
        assert!(!CodeIndex::empty(CodeSystem::Icd).is_current("abc"));
    }

    #[test]
    fn index_fingerprint_tracks_embedding_model() {
        let key = index_fingerprint("abc", &MockEmbedder::new());
        assert!(key.starts_with("abc/"));
        assert_ne!(key, index_fingerprint("abc", &MockEmbedder::with_dimension(16)));
        assert_ne!(key, index_fingerprint("abc", &ShortEmbedder));
        assert_eq!(key, index_fingerprint("abc", &MockEmbedder::new()));
    }

    #[test]
    fn rows_iterate_in_catalog_order() {
        let index =
            CodeIndex::build(CodeSystem::Icd, &catalog(), &MockEmbedder::new(), 64).unwrap();
        let positions: Vec<(usize, &str)> = index.rows().map(|r| (r.position, r.code)).collect();
        assert_eq!(positions, vec![(0, "K57.90"), (1, "K64.8"), (2, "K63.89")]);
    }

    #[test]
    fn index_set_routes_by_system() {
        let set = CodeIndexSet::empty();
        assert_eq!(set.get(CodeSystem::Icd).system(), CodeSystem::Icd);
        assert_eq!(set.get(CodeSystem::Cpt).system(), CodeSystem::Cpt);
    }
}
