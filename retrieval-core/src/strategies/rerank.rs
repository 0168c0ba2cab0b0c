use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use common::model::Document;
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::{Strategy, StrategyKind};

const DEFAULT_INITIAL_K: usize = 20;

fn rerank_prompt(query: &str, documents: &[Document]) -> String {
    let candidates: String = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let preview: String = doc.content.chars().take(500).collect();
            format!("Document {}:\n{}", i + 1, preview)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an expert at ranking search results by relevance.\n\n\
         Query: {query}\n\n\
         Documents:\n{candidates}\n\n\
         Rank the documents from most relevant (1) to least relevant ({len}). \
         Reply with only the document numbers in ranked order, one per line.\n\n\
         Ranking (most to least relevant):",
        len = documents.len()
    )
}

/// Parses an LLM ranking reply into a 0-based permutation over
/// `num_documents` slots. Tolerant of stray prose around the numbers; any
/// document never mentioned is appended at the end in its original order so
/// the output is always a complete permutation even when the reply is
/// partial or malformed.
fn parse_permutation(response: &str, num_documents: usize) -> Vec<usize> {
    let mut ranking = Vec::new();
    for token in response.split(|c: char| !c.is_ascii_digit()) {
        if token.is_empty() {
            continue;
        }
        if let Ok(n) = token.parse::<usize>() {
            if n >= 1 && n <= num_documents && !ranking.contains(&(n - 1)) {
                ranking.push(n - 1);
            }
        }
    }
    for i in 0..num_documents {
        if !ranking.contains(&i) {
            ranking.push(i);
        }
    }
    ranking
}

/// Retrieves a wider candidate pool with a base strategy, then asks the LLM
/// to reorder it by relevance. Best for queries where getting the single
/// best passage matters more than retrieval latency.
pub struct RerankStrategy {
    base: Arc<dyn Strategy>,
    initial_k: usize,
}

impl RerankStrategy {
    pub fn new(base: Arc<dyn Strategy>) -> Self {
        Self {
            base,
            initial_k: DEFAULT_INITIAL_K,
        }
    }

    pub fn with_initial_k(base: Arc<dyn Strategy>, initial_k: usize) -> Self {
        Self { base, initial_k }
    }
}

#[async_trait]
impl Strategy for RerankStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rerank
    }

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        params: &Value,
        deps: &Dependencies,
    ) -> Result<Vec<Document>, AppError> {
        let candidate_k = self.initial_k.max(k * 2);
        let candidates = self.base.retrieve(query, candidate_k, params, deps).await?;

        if candidates.len() <= 1 {
            return Ok(candidates);
        }

        let reranked = match deps.llm.complete(&rerank_prompt(query, &candidates), 0.0).await {
            Ok(response) => {
                let permutation = parse_permutation(&response, candidates.len());
                let num_candidates = candidates.len();
                let mut candidates = candidates;
                let mut reordered = Vec::with_capacity(num_candidates);
                for (rerank_position, original_idx) in permutation.into_iter().enumerate() {
                    let mut doc = std::mem::replace(&mut candidates[original_idx], Document::new(""));
                    doc.set_reserved("rerank_score", (num_candidates - rerank_position) as u64);
                    reordered.push(doc);
                }
                reordered
            }
            Err(err) => {
                warn!(error = %err, "LLM reranking failed, returning base ordering");
                candidates
            }
        };

        let mut results: Vec<Document> = reranked.into_iter().take(k).collect();
        for doc in &mut results {
            doc.set_reserved("retrieval_strategy", "rerank");
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::adapters::memory::{InMemoryCache, InMemoryDocumentStore, InMemoryVectorStore};
    use common::adapters::openai::OpenAiAdapter;
    use common::adapters::LlmClient;
    use common::config::AppConfig;

    use crate::metrics::InMemoryMetricsSink;
    use crate::strategies::KeywordStrategy;

    use super::*;

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, AppError> {
            Ok(self.0.to_owned())
        }
    }

    #[test]
    fn parses_partial_ranking_and_appends_missing_indices() {
        let permutation = parse_permutation("2\n1", 3);
        assert_eq!(permutation, vec![1, 0, 2]);
    }

    #[test]
    fn ignores_prose_around_numbers() {
        let permutation = parse_permutation("Document 2 is most relevant.\nThen document 1.", 2);
        assert_eq!(permutation, vec![1, 0]);
    }

    #[tokio::test]
    async fn reorders_candidates_per_llm_ranking() {
        let deps = Dependencies {
            embedder: Arc::new(OpenAiAdapter::stub()),
            llm: Arc::new(FixedLlm("2\n1")),
            vector_store: Arc::new(InMemoryVectorStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::new(vec![
                Document::new("alpha fox"),
                Document::new("beta fox"),
            ])),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            config: AppConfig::for_tests(),
        };

        let base = Arc::new(KeywordStrategy::new());
        let strategy = RerankStrategy::new(base);

        let results = strategy.retrieve("fox", 2, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results[0].content, "beta fox");
        assert_eq!(results[1].content, "alpha fox");
    }
}
