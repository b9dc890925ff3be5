use super::patterns::find_explicit_codes;
use super::sections::{ReportSections, Section};
use crate::config::ExtractionConfig;
use crate::models::{CodeSystem, MatchCandidate, MatchSource};
use crate::pipeline::retrieval::{CodeSearcher, RetrievalError};

/// Confidence of an explicit code the catalog confirms.
pub const CONFIRMED_CONFIDENCE: f32 = 1.0;

/// Confidence of an explicit code the catalog does not know.
pub const UNCONFIRMED_CONFIDENCE: f32 = 0.95;

/// Catalog description of `code`, if a top-1 lookup clears `threshold`.
pub fn lookup_description(
    searcher: &CodeSearcher<'_>,
    system: CodeSystem,
    code: &str,
    threshold: f32,
) -> Result<Option<String>, RetrievalError> {
    Ok(searcher
        .search(system, code, 1, threshold)?
        .into_iter()
        .next()
        .map(|hit| hit.description))
}

/// Codes written out in the report, each looked up in the catalog only to
/// attach a description. A failed lookup counts as a catalog miss.
pub fn explicit_matches(
    system: CodeSystem,
    text: &str,
    searcher: &CodeSearcher<'_>,
    config: &ExtractionConfig,
) -> Vec<MatchCandidate> {
    let codes = find_explicit_codes(system, text);
    let mut matches = Vec::with_capacity(codes.len());

    for code in codes {
        let description =
            match lookup_description(searcher, system, &code, config.explicit_lookup_threshold) {
                Ok(description) => description,
                Err(e) => {
                    tracing::warn!(
                        system = %system,
                        code = %code,
                        error = %e,
                        "Catalog lookup failed, keeping code unconfirmed"
                    );
                    None
                }
            };

        let candidate = match description {
            Some(description) => MatchCandidate::new(
                code,
                description,
                CONFIRMED_CONFIDENCE,
                MatchSource::ExplicitCode,
            ),
            None => {
                let description = match system {
                    CodeSystem::Icd => code.clone(),
                    CodeSystem::Cpt => format!("CPT Code {code}"),
                };
                MatchCandidate::new(
                    code,
                    description,
                    UNCONFIRMED_CONFIDENCE,
                    MatchSource::ExplicitCode,
                )
            }
        };
        matches.push(candidate);
    }

    tracing::debug!(system = %system, count = matches.len(), "Explicit codes matched");
    matches
}

/// Query text for retrieval: the relevant sections joined, or the whole
/// report when they are all blank.
pub fn retrieval_context(system: CodeSystem, sections: &ReportSections, text: &str) -> String {
    let context = sections.joined(Section::context_for(system));
    if context.trim().is_empty() {
        text.to_string()
    } else {
        context
    }
}

/// Similarity matches for the report's section context. A failed search
/// yields no matches.
pub fn retrieval_matches(
    system: CodeSystem,
    text: &str,
    sections: &ReportSections,
    searcher: &CodeSearcher<'_>,
    config: &ExtractionConfig,
) -> Vec<MatchCandidate> {
    let query = retrieval_context(system, sections, text);
    searcher
        .search(system, &query, config.top_k, config.similarity_threshold)
        .unwrap_or_else(|e| {
            tracing::warn!(
                system = %system,
                error = %e,
                "Code search failed, no retrieval evidence"
            );
            Vec::new()
        })
}
