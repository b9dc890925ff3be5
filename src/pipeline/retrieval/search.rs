use super::RetrievalError;
use crate::models::{CodeSystem, MatchCandidate, MatchSource};
use crate::pipeline::storage::{CodeIndexSet, EmbeddingModel};

/// Top-K cosine search over the code indices of a run.
pub struct CodeSearcher<'a> {
    indices: &'a CodeIndexSet,
    embedder: &'a dyn EmbeddingModel,
}

impl<'a> CodeSearcher<'a> {
    pub fn new(indices: &'a CodeIndexSet, embedder: &'a dyn EmbeddingModel) -> Self {
        Self { indices, embedder }
    }

    /// Rank every row of `system` against `query`, keep the first `top_k`,
    /// then drop those under `threshold`. Never padded.
    ///
    /// An empty index returns no candidates without embedding the query.
    pub fn search(
        &self,
        system: CodeSystem,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<MatchCandidate>, RetrievalError> {
        let index = self.indices.get(system);
        if index.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(query)
            .map_err(|source| RetrievalError::QueryEmbedding {
                system: system.to_string(),
                source,
            })?;

        let mut scored: Vec<(usize, f32)> = index
            .rows()
            .map(|row| (row.position, cosine_similarity(&query_vec, row.embedding)))
            .collect();

        // sort_by is stable: equal scores keep catalog order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        let results: Vec<MatchCandidate> = scored
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .map(|(pos, score)| {
                MatchCandidate::new(
                    index.codes()[pos].clone(),
                    index.descriptions()[pos].clone(),
                    score,
                    MatchSource::NlpRetrieval,
                )
            })
            .collect();

        tracing::debug!(
            system = %system,
            rows = index.len(),
            top_k,
            threshold,
            hits = results.len(),
            "Code search complete"
        );

        Ok(results)
    }
}

/// Cosine similarity; 0.0 for empty, zero-norm, mismatched or non-finite
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}
