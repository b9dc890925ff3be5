use std::collections::HashSet;

use crate::models::{MatchCandidate, ReconciledCodeSet};

/// Cap on a reconciled code set.
pub const MAX_CODES: usize = 10;

/// Merge explicit and retrieval evidence for one code system.
///
/// Explicit matches come first and win on code collision whatever their
/// confidence. Duplicates keep their first occurrence, the survivors are
/// stably sorted by confidence (descending) and cut to `max_codes`.
pub fn reconcile(
    explicit: Vec<MatchCandidate>,
    retrieval: Vec<MatchCandidate>,
    max_codes: usize,
) -> ReconciledCodeSet {
    let explicit_codes: HashSet<String> = explicit.iter().map(|c| c.code.clone()).collect();

    let merged = explicit.into_iter().chain(
        retrieval
            .into_iter()
            .filter(|c| !explicit_codes.contains(&c.code)),
    );

    let mut seen = HashSet::new();
    let mut ranked: Vec<MatchCandidate> = merged.filter(|c| seen.insert(c.code.clone())).collect();

    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked.truncate(max_codes);

    ReconciledCodeSet::from_ranked(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchSource;

    fn explicit(code: &str, confidence: f32) -> MatchCandidate {
        MatchCandidate::new(code, code, confidence, MatchSource::ExplicitCode)
    }

    fn retrieved(code: &str, confidence: f32) -> MatchCandidate {
        MatchCandidate::new(
            code,
            format!("{code} from catalog"),
            confidence,
            MatchSource::NlpRetrieval,
        )
    }

    #[test]
    fn explicit_wins_on_collision() {
        let set = reconcile(
            vec![explicit("K57.90", 0.95)],
            vec![retrieved("K57.90", 0.99), retrieved("K64.8", 0.7)],
            MAX_CODES,
        );

        assert_eq!(set.codes(), vec!["K57.90", "K64.8"]);
        let first = &set.candidates()[0];
        assert_eq!(first.source, MatchSource::ExplicitCode);
        assert_eq!(first.confidence, 0.95);
    }

    #[test]
    fn retrieval_can_outrank_explicit_by_confidence() {
        let set = reconcile(
            vec![explicit("Z86.0100", 0.95)],
            vec![retrieved("K63.89", 0.97)],
            MAX_CODES,
        );
        assert_eq!(set.codes(), vec!["K63.89", "Z86.0100"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let set = reconcile(
            vec![],
            vec![retrieved("45378", 0.6), retrieved("45378", 0.8)],
            MAX_CODES,
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.candidates()[0].confidence, 0.6);
    }

    #[test]
    fn equal_confidence_keeps_insertion_order() {
        let set = reconcile(
            vec![explicit("K64.8", 1.0), explicit("K57.90", 1.0)],
            vec![],
            MAX_CODES,
        );
        assert_eq!(set.codes(), vec!["K64.8", "K57.90"]);
    }

    #[test]
    fn truncates_to_the_highest_ten() {
        let retrieval: Vec<MatchCandidate> = (0..15)
            .map(|i| retrieved(&format!("C{i:02}"), i as f32 / 100.0))
            .collect();

        let set = reconcile(vec![], retrieval, MAX_CODES);

        assert_eq!(set.len(), 10);
        assert_eq!(set.candidates()[0].code, "C14");
        assert_eq!(set.candidates()[9].code, "C05");
    }

    #[test]
    fn nan_confidence_does_not_disturb_ranking() {
        let set = reconcile(
            vec![],
            vec![retrieved("A", 0.5), retrieved("B", f32::NAN), retrieved("C", 0.9)],
            MAX_CODES,
        );
        assert_eq!(set.len(), 3);
        let codes = set.codes();
        let pos = |code: &str| codes.iter().position(|c| c == code).unwrap();
        assert!(pos("C") < pos("A"));
    }

    #[test]
    fn empty_inputs_give_empty_set() {
        assert!(reconcile(vec![], vec![], MAX_CODES).is_empty());
    }
}
