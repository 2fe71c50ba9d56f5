//! Similarity matching of clauses against the pattern library.

use crate::config::MatchingConfig;
use crate::embedding::cosine_similarity;
use crate::library::PatternLibrary;
use crate::models::{Category, Suggestion};

/// Score a clause embedding against every same-category pattern and return
/// the ranked suggestions.
///
/// Patterns at or above the similarity threshold are ranked by
/// `similarity × confidence`, ties broken by higher support count, then most
/// recently updated, then id (fully deterministic). The top K survive; each
/// suggestion reports its raw similarity.
pub fn match_clause(
    library: &PatternLibrary,
    category: Category,
    embedding: &[f32],
    config: &MatchingConfig,
) -> Vec<Suggestion> {
    let mut scored: Vec<(f32, f32, &crate::library::Pattern)> = library
        .patterns(category)
        .iter()
        .filter_map(|pattern| {
            let similarity = cosine_similarity(embedding, &pattern.centroid);
            if similarity >= config.threshold {
                Some((similarity * pattern.confidence(), similarity, pattern))
            } else {
                None
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.2.support_count.cmp(&a.2.support_count))
            .then(b.2.updated_at.cmp(&a.2.updated_at))
            .then(a.2.id.cmp(&b.2.id))
    });
    scored.truncate(config.top_k);

    scored
        .into_iter()
        .map(|(_, similarity, pattern)| Suggestion {
            pattern_id: pattern.id.clone(),
            similarity,
            replacement: pattern.correction.clone(),
            confidence: pattern.confidence(),
            support_count: pattern.support_count,
        })
        .collect()
}
