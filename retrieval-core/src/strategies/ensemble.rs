use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use common::model::Document;
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::{Strategy, StrategyKind};

const DEFAULT_RRF_CONSTANT: u32 = 60;

struct Member {
    kind: StrategyKind,
    strategy: Arc<dyn Strategy>,
    weight: f32,
}

/// Fuses results from several member strategies with Reciprocal Rank
/// Fusion: `score += weight / (rank_0_based + 1 + rrf_constant)`, summed
/// across every member that surfaced a given document. Runs members
/// concurrently and tolerates any subset of them failing — RRF only needs
/// the ones that succeeded.
pub struct EnsembleStrategy {
    members: RwLock<Vec<Member>>,
    rrf_constant: u32,
}

impl EnsembleStrategy {
    pub fn new(members: Vec<(StrategyKind, Arc<dyn Strategy>, f32)>) -> Self {
        Self {
            members: RwLock::new(
                members
                    .into_iter()
                    .map(|(kind, strategy, weight)| Member { kind, strategy, weight })
                    .collect(),
            ),
            rrf_constant: DEFAULT_RRF_CONSTANT,
        }
    }

    pub fn with_rrf_constant(members: Vec<(StrategyKind, Arc<dyn Strategy>, f32)>, rrf_constant: u32) -> Self {
        let mut ensemble = Self::new(members);
        ensemble.rrf_constant = rrf_constant;
        ensemble
    }

    pub async fn add_strategy(&self, kind: StrategyKind, strategy: Arc<dyn Strategy>, weight: f32) {
        let mut members = self.members.write().await;
        if members.iter().any(|m| m.kind == kind) {
            return;
        }
        members.push(Member { kind, strategy, weight });
    }

    pub async fn remove_strategy(&self, kind: StrategyKind) {
        self.members.write().await.retain(|m| m.kind != kind);
    }

    pub async fn update_strategy_weights(&self, weights: &HashMap<StrategyKind, f32>) {
        let mut members = self.members.write().await;
        for member in members.iter_mut() {
            if let Some(weight) = weights.get(&member.kind) {
                member.weight = *weight;
            }
        }
    }
}

#[async_trait]
impl Strategy for EnsembleStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ensemble
    }

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        params: &Value,
        deps: &Dependencies,
    ) -> Result<Vec<Document>, AppError> {
        let members = self.members.read().await;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let sub_k = (3 * k).min(15);

        let futures = members.iter().map(|member| {
            let strategy = Arc::clone(&member.strategy);
            let query = query.to_owned();
            let params = params.clone();
            async move { strategy.retrieve(&query, sub_k, &params, deps).await }
        });

        let outcomes = join_all(futures).await;

        // Insertion order (first-seen document wins ties) matters for RRF
        // fusion, so scores live in a Vec walked in first-seen order rather
        // than a HashMap, whose iteration order is randomized per process.
        let mut order: HashMap<String, usize> = HashMap::new();
        let mut ranked: Vec<(String, f32)> = Vec::new();
        let mut doc_objects: HashMap<String, Document> = HashMap::new();
        let mut contributing: HashMap<String, Vec<&'static str>> = HashMap::new();

        for (member, outcome) in members.iter().zip(outcomes) {
            let docs = match outcome {
                Ok(docs) => docs,
                Err(err) => {
                    warn!(strategy = %member.kind, error = %err, "ensemble member failed, continuing without it");
                    continue;
                }
            };

            for (rank, doc) in docs.into_iter().enumerate() {
                let identity = doc.fusion_identity(1000);
                let rrf_score = member.weight / (rank as f32 + 1.0 + self.rrf_constant as f32);

                match order.get(&identity) {
                    Some(&idx) => ranked[idx].1 += rrf_score,
                    None => {
                        order.insert(identity.clone(), ranked.len());
                        ranked.push((identity.clone(), rrf_score));
                    }
                }
                contributing.entry(identity.clone()).or_default().push(member.kind.as_str());

                doc_objects
                    .entry(identity.clone())
                    .and_modify(|existing| {
                        if doc.metadata.len() > existing.metadata.len() {
                            *existing = doc.clone();
                        }
                    })
                    .or_insert(doc);
            }
        }

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        let mut results = Vec::with_capacity(ranked.len());
        for (identity, score) in ranked {
            if let Some(mut doc) = doc_objects.remove(&identity) {
                doc.set_reserved("retrieval_strategy", "ensemble");
                doc.set_reserved("rrf_score", score);
                let strategies = contributing.remove(&identity).unwrap_or_default();
                doc.set_reserved("contributing_strategies", Value::from(strategies));
                results.push(doc);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::adapters::memory::{InMemoryCache, InMemoryDocumentStore, InMemoryVectorStore};
    use common::adapters::openai::OpenAiAdapter;
    use common::config::AppConfig;

    use crate::metrics::InMemoryMetricsSink;

    use super::*;

    struct FixedStrategy {
        kind: StrategyKind,
        docs: Vec<Document>,
    }

    #[async_trait]
    impl Strategy for FixedStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }
        async fn retrieve(
            &self,
            _query: &str,
            k: usize,
            _params: &Value,
            _deps: &Dependencies,
        ) -> Result<Vec<Document>, AppError> {
            Ok(self.docs.iter().take(k).cloned().collect())
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl Strategy for FailingStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Vector
        }
        async fn retrieve(
            &self,
            _query: &str,
            _k: usize,
            _params: &Value,
            _deps: &Dependencies,
        ) -> Result<Vec<Document>, AppError> {
            Err(AppError::Internal("boom".into()))
        }
    }

    fn test_deps() -> Dependencies {
        Dependencies {
            embedder: Arc::new(OpenAiAdapter::stub()),
            llm: Arc::new(OpenAiAdapter::stub()),
            vector_store: Arc::new(InMemoryVectorStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::default()),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            config: AppConfig::for_tests(),
        }
    }

    #[tokio::test]
    async fn document_agreed_on_by_two_strategies_outranks_one_surfaced_by_a_single_strategy() {
        let shared = Document::new("shared passage").with_metadata("source", "doc-a");
        let unique_a = Document::new("only in keyword").with_metadata("source", "doc-b");
        let unique_b = Document::new("only in vector").with_metadata("source", "doc-c");

        let members: Vec<(StrategyKind, Arc<dyn Strategy>, f32)> = vec![
            (
                StrategyKind::Keyword,
                Arc::new(FixedStrategy { kind: StrategyKind::Keyword, docs: vec![shared.clone(), unique_a] }),
                1.0,
            ),
            (
                StrategyKind::Vector,
                Arc::new(FixedStrategy { kind: StrategyKind::Vector, docs: vec![shared, unique_b] }),
                1.0,
            ),
        ];
        let ensemble = EnsembleStrategy::new(members);
        let deps = test_deps();

        let results = ensemble.retrieve("q", 3, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results[0].content, "shared passage");
    }

    #[tokio::test]
    async fn survives_a_failing_member_strategy() {
        let docs = vec![Document::new("still retrieved")];
        let members: Vec<(StrategyKind, Arc<dyn Strategy>, f32)> = vec![
            (StrategyKind::Keyword, Arc::new(FixedStrategy { kind: StrategyKind::Keyword, docs }), 1.0),
            (StrategyKind::Vector, Arc::new(FailingStrategy), 1.0),
        ];
        let ensemble = EnsembleStrategy::new(members);
        let deps = test_deps();

        let results = ensemble.retrieve("q", 3, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "still retrieved");
    }

    #[tokio::test]
    async fn rrf_math() {
        let d1 = Document::new("d1");
        let d2 = Document::new("d2");
        let d3 = Document::new("d3");
        let d4 = Document::new("d4");
        let d5 = Document::new("d5");

        let members: Vec<(StrategyKind, Arc<dyn Strategy>, f32)> = vec![
            (
                StrategyKind::Keyword,
                Arc::new(FixedStrategy {
                    kind: StrategyKind::Keyword,
                    docs: vec![d1.clone(), d2.clone(), d3.clone()],
                }),
                1.0,
            ),
            (
                StrategyKind::Vector,
                Arc::new(FixedStrategy { kind: StrategyKind::Vector, docs: vec![d2.clone(), d4.clone()] }),
                1.0,
            ),
            (
                StrategyKind::ParentDoc,
                Arc::new(FixedStrategy { kind: StrategyKind::ParentDoc, docs: vec![d1.clone(), d5.clone()] }),
                1.0,
            ),
        ];
        let ensemble = EnsembleStrategy::new(members);
        let deps = test_deps();

        let results = ensemble.retrieve("q", 3, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "d1");
        assert_eq!(results[1].content, "d2");
        // d4 and d5 tie at 1/62; d4 was inserted first (via member B, processed
        // before member C), so it must win the tie-break.
        assert_eq!(results[2].content, "d4");

        let d1_score = results[0].metadata["rrf_score"].as_f64().unwrap() as f32;
        let d2_score = results[1].metadata["rrf_score"].as_f64().unwrap() as f32;
        let d4_score = results[2].metadata["rrf_score"].as_f64().unwrap() as f32;

        assert!((d1_score - (1.0 / 61.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((d2_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((d4_score - 1.0 / 62.0).abs() < 1e-6);
    }
}
