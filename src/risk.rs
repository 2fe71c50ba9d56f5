//! Deterministic risk rules.
//!
//! Per-clause risk derives from the best suggestion's similarity and the
//! matched pattern's support; document risk is the maximum clause risk,
//! elevated when a mandatory category is missing entirely.

use crate::config::RiskConfig;
use crate::models::{Category, Clause, RiskLevel, Suggestion};

/// Rule table for a single clause. Every retained suggestion already passed
/// the matching threshold, so any match is at least `Medium`.
pub fn assess_clause(suggestions: &[Suggestion], config: &RiskConfig) -> RiskLevel {
    match suggestions.first() {
        None => RiskLevel::Low,
        Some(best)
            if best.similarity >= config.strong_match
                && best.support_count >= config.severe_support =>
        {
            RiskLevel::High
        }
        Some(_) => RiskLevel::Medium,
    }
}

/// Mandatory categories with no clause anywhere in the document, in
/// [`Category::ALL`] order.
pub fn missing_mandatory(clauses: &[Clause], mandatory: &[Category]) -> Vec<Category> {
    Category::ALL
        .iter()
        .copied()
        .filter(|c| mandatory.contains(c))
        .filter(|c| !clauses.iter().any(|clause| clause.category == *c))
        .collect()
}

/// Whole-document risk: max clause risk, `High` when any mandatory category
/// is absent.
pub fn document_risk(clauses: &[Clause], missing: &[Category]) -> RiskLevel {
    if !missing.is_empty() {
        return RiskLevel::High;
    }
    clauses
        .iter()
        .map(|c| c.risk)
        .max()
        .unwrap_or(RiskLevel::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    fn suggestion(similarity: f32, support: u32) -> Suggestion {
        Suggestion {
            pattern_id: "p".to_string(),
            similarity,
            replacement: "r".to_string(),
            confidence: support as f32 / (support as f32 + 1.0),
            support_count: support,
        }
    }

    fn clause(category: Category, risk: RiskLevel) -> Clause {
        Clause {
            id: 0,
            para_start: 0,
            para_end: 0,
            category,
            text: String::new(),
            risk,
            suggestions: vec![],
            decision: Decision::Pending,
        }
    }

    fn config() -> RiskConfig {
        RiskConfig::default()
    }

    #[test]
    fn no_suggestion_is_low() {
        assert_eq!(assess_clause(&[], &config()), RiskLevel::Low);
    }

    #[test]
    fn matched_clause_is_elevated_over_unmatched() {
        let matched = assess_clause(&[suggestion(0.90, 1)], &config());
        assert!(matched > RiskLevel::Low);
    }

    #[test]
    fn strong_match_with_severe_support_is_high() {
        assert_eq!(
            assess_clause(&[suggestion(0.95, 5)], &config()),
            RiskLevel::High
        );
        // Strong match but thin support stays medium.
        assert_eq!(
            assess_clause(&[suggestion(0.95, 1)], &config()),
            RiskLevel::Medium
        );
        // Well-supported but ordinary match stays medium.
        assert_eq!(
            assess_clause(&[suggestion(0.80, 5)], &config()),
            RiskLevel::Medium
        );
    }

    #[test]
    fn missing_mandatory_categories_are_reported_in_order() {
        let clauses = vec![clause(Category::Confidentiality, RiskLevel::Low)];
        let mandatory = vec![
            Category::GoverningLaw,
            Category::Confidentiality,
            Category::Duration,
        ];
        let missing = missing_mandatory(&clauses, &mandatory);
        assert_eq!(missing, vec![Category::Duration, Category::GoverningLaw]);
    }

    #[test]
    fn missing_category_elevates_document_risk() {
        let clauses = vec![clause(Category::Other, RiskLevel::Low)];
        assert_eq!(
            document_risk(&clauses, &[Category::Duration]),
            RiskLevel::High
        );
        assert_eq!(document_risk(&clauses, &[]), RiskLevel::Low);
    }

    #[test]
    fn document_risk_is_max_clause_risk() {
        let clauses = vec![
            clause(Category::Other, RiskLevel::Low),
            clause(Category::Duration, RiskLevel::Medium),
        ];
        assert_eq!(document_risk(&clauses, &[]), RiskLevel::Medium);
    }

    #[test]
    fn same_input_same_risk() {
        let suggestions = vec![suggestion(0.91, 4)];
        assert_eq!(
            assess_clause(&suggestions, &config()),
            assess_clause(&suggestions, &config())
        );
    }
}
