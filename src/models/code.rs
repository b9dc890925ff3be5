use serde::{Deserialize, Serialize};

use super::enums::MatchSource;

/// One row of a reference code catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub description: String,
}

impl CatalogEntry {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Text embedded for this row: `"{code} {description}"`.
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.code, self.description)
    }
}

/// A code proposed by one evidence source.
///
/// Confidence scales differ per source: explicit matches are fixed at
/// 1.0 / 0.95, retrieval matches carry the raw cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub code: String,
    pub description: String,
    pub confidence: f32,
    pub source: MatchSource,
}

impl MatchCandidate {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        confidence: f32,
        source: MatchSource,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            confidence,
            source,
        }
    }
}

/// Ranked, deduplicated candidates for one code system of one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconciledCodeSet {
    candidates: Vec<MatchCandidate>,
}

impl ReconciledCodeSet {
    /// Wrap candidates that are already deduplicated, sorted and capped.
    pub(crate) fn from_ranked(candidates: Vec<MatchCandidate>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[MatchCandidate] {
        &self.candidates
    }

    pub fn codes(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.code.clone()).collect()
    }

    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.candidates.iter().map(|c| c.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
