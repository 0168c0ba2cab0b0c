use std::sync::Arc;

use common::AppError;

use crate::strategies::{EnsembleStrategy, KeywordStrategy, MultiQueryStrategy, ParentDocStrategy, RerankStrategy, VectorStrategy};
use crate::strategy::{Strategy, StrategyKind};

/// Default ensemble membership, mirroring the "proven high-performance
/// combination" the original retriever used: keyword for precision, vector
/// for recall, rerank to sharpen the merged set.
const DEFAULT_ENSEMBLE_MEMBERS: [StrategyKind; 3] = [StrategyKind::Keyword, StrategyKind::Vector, StrategyKind::Rerank];

/// Builds a `Strategy` trait object for a given `StrategyKind`. Strategies
/// that wrap another strategy (multi_query, rerank, ensemble) always wrap
/// freshly constructed base strategies rather than reaching back into the
/// factory at call time, so there is no risk of recursive construction.
pub struct StrategyFactory;

impl StrategyFactory {
    pub fn build(kind: StrategyKind) -> Arc<dyn Strategy> {
        match kind {
            StrategyKind::Keyword => Arc::new(KeywordStrategy::new()),
            StrategyKind::Vector => Arc::new(VectorStrategy::new()),
            StrategyKind::ParentDoc => Arc::new(ParentDocStrategy::new()),
            StrategyKind::MultiQuery => Arc::new(MultiQueryStrategy::new(Arc::new(VectorStrategy::new()))),
            StrategyKind::Rerank => Arc::new(RerankStrategy::new(Arc::new(VectorStrategy::new()))),
            StrategyKind::Ensemble => Arc::new(Self::build_ensemble(&DEFAULT_ENSEMBLE_MEMBERS)),
        }
    }

    pub fn build_ensemble(members: &[StrategyKind]) -> EnsembleStrategy {
        let built = members.iter().map(|kind| (*kind, Self::build(*kind), 1.0)).collect();
        EnsembleStrategy::new(built)
    }

    /// Resolves a strategy name from an MCP request, including the `"auto"`
    /// pseudo-strategy which picks a concrete one by query heuristics rather
    /// than naming a real strategy itself.
    pub fn resolve(name: &str, query: &str) -> Result<StrategyKind, AppError> {
        if name == "auto" {
            return Ok(recommend(query).primary);
        }
        name.parse()
    }
}

/// A recommendation with reasoning, surfaced by the `strategies://info`
/// resource and used internally by `"auto"` strategy resolution.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub primary: StrategyKind,
    pub alternatives: Vec<StrategyKind>,
    pub reasoning: &'static str,
    pub query_type: &'static str,
}

const FACTUAL_MARKERS: [&str; 4] = ["what", "when", "where", "who"];
const TECHNICAL_MARKERS: [&str; 7] = ["function", "class", "method", "api", "error", "bug", "fix"];
const CONCEPTUAL_MARKERS: [&str; 4] = ["how", "why", "explain", "compare"];

/// Pure function of the query text: same query always recommends the same
/// strategy, independent of any request/session state.
pub fn recommend(query: &str) -> Recommendation {
    let lower = query.to_lowercase();
    let word_count = query.split_whitespace().count();

    let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if word_count <= 3 && contains_any(&FACTUAL_MARKERS) {
        return Recommendation {
            primary: StrategyKind::Keyword,
            alternatives: vec![StrategyKind::Vector, StrategyKind::Rerank],
            reasoning: "short factual question detected - keyword search for exact matching",
            query_type: "factual",
        };
    }

    if contains_any(&TECHNICAL_MARKERS) {
        return Recommendation {
            primary: StrategyKind::Keyword,
            alternatives: vec![StrategyKind::ParentDoc, StrategyKind::Rerank],
            reasoning: "technical query - keyword search for precise term matching",
            query_type: "technical",
        };
    }

    if word_count > 10 || contains_any(&CONCEPTUAL_MARKERS) {
        return Recommendation {
            primary: StrategyKind::Ensemble,
            alternatives: vec![StrategyKind::MultiQuery, StrategyKind::Vector],
            reasoning: "conceptual question - ensemble for comprehensive coverage",
            query_type: "conceptual",
        };
    }

    if (4..=10).contains(&word_count) {
        return Recommendation {
            primary: StrategyKind::Vector,
            alternatives: vec![StrategyKind::Ensemble, StrategyKind::Rerank],
            reasoning: "medium complexity query - vector search for semantic understanding",
            query_type: "general",
        };
    }

    Recommendation {
        primary: StrategyKind::Ensemble,
        alternatives: vec![StrategyKind::Vector, StrategyKind::Rerank],
        reasoning: "unclassified query - ensemble as the robust default",
        query_type: "general",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_factual_question_recommends_keyword() {
        let rec = recommend("what is bm25");
        assert_eq!(rec.primary, StrategyKind::Keyword);
    }

    #[test]
    fn technical_term_recommends_keyword() {
        let rec = recommend("how to fix the null pointer error in this function");
        assert_eq!(rec.primary, StrategyKind::Keyword);
    }

    #[test]
    fn fix_alone_recommends_keyword() {
        let rec = recommend("fix this");
        assert_eq!(rec.primary, StrategyKind::Keyword);
    }

    #[test]
    fn long_conceptual_question_recommends_ensemble() {
        let rec = recommend("explain in detail why distributed consensus algorithms are so hard to get right in practice");
        assert_eq!(rec.primary, StrategyKind::Ensemble);
    }

    #[test]
    fn recommendation_is_pure_function_of_query_text() {
        let a = recommend("tell me about vector databases");
        let b = recommend("tell me about vector databases");
        assert_eq!(a.primary, b.primary);
        assert_eq!(a.query_type, b.query_type);
    }

    #[test]
    fn unknown_strategy_name_is_rejected() {
        let result = StrategyFactory::resolve("not_a_real_strategy", "q");
        assert!(result.is_err());
    }
}
