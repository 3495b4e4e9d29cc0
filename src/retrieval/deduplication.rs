//! Result deduplication by passage text

use crate::retrieval::ScoredCandidate;
use ahash::AHashSet;

/// Drop candidates whose exact text was already seen, keeping the first
/// occurrence (and its scores) in place.
pub fn deduplicate_by_text(candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut seen: AHashSet<String> = AHashSet::with_capacity(candidates.len());

    candidates
        .into_iter()
        .filter(|c| seen.insert(c.passage.text.clone()))
        .collect()
}
