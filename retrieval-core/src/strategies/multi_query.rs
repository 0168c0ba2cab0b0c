use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use common::model::Document;
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::{Strategy, StrategyKind};

const DEFAULT_NUM_QUERIES: usize = 3;

fn expansion_prompt(query: &str, num_queries: usize) -> String {
    format!(
        "You are helping improve search recall. Given the original question, \
         generate {num_queries} different but related search queries that would help \
         find comprehensive information about the topic.\n\n\
         Make the queries different in wording and perspective, focused on different \
         aspects of the topic, and specific enough to be useful for search.\n\n\
         Original question: {query}\n\n\
         Generate exactly {num_queries} alternative search queries, one per line, with no extra commentary:"
    )
}

/// Strips leading list markers ("1.", "-", "*") from a line.
fn strip_list_marker(line: &str) -> &str {
    line.trim().trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | '-' | '*' | ')' | ' '))
}

fn parse_query_variations(response: &str, num_queries: usize) -> Vec<String> {
    let mut queries = Vec::new();
    for line in response.lines() {
        let cleaned = strip_list_marker(line).trim();
        if !cleaned.is_empty() {
            queries.push(cleaned.to_owned());
        }
        if queries.len() >= num_queries {
            break;
        }
    }
    queries
}

/// Expands the original query into several paraphrased variants via the
/// LLM, retrieves with the base strategy under each variant, and merges the
/// unique results. Best for ambiguous or multi-faceted questions where a
/// single phrasing would miss relevant passages.
pub struct MultiQueryStrategy {
    base: Arc<dyn Strategy>,
    num_queries: usize,
}

impl MultiQueryStrategy {
    pub fn new(base: Arc<dyn Strategy>) -> Self {
        Self {
            base,
            num_queries: DEFAULT_NUM_QUERIES,
        }
    }

    pub fn with_num_queries(base: Arc<dyn Strategy>, num_queries: usize) -> Self {
        Self { base, num_queries }
    }
}

#[async_trait]
impl Strategy for MultiQueryStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MultiQuery
    }

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        params: &Value,
        deps: &Dependencies,
    ) -> Result<Vec<Document>, AppError> {
        let mut query_variants = vec![query.to_owned()];

        match deps.llm.complete(&expansion_prompt(query, self.num_queries), 0.7).await {
            Ok(response) => query_variants.extend(parse_query_variations(&response, self.num_queries)),
            Err(err) => warn!(error = %err, "query expansion failed, retrieving with the original query only"),
        }

        let per_query_k = (k * 2).max(k);
        let mut seen = std::collections::HashSet::new();
        let mut results = Vec::new();

        for variant in query_variants {
            if results.len() >= k {
                break;
            }
            let docs = match self.base.retrieve(&variant, per_query_k, params, deps).await {
                Ok(docs) => docs,
                Err(err) => {
                    warn!(error = %err, variant = %variant, "base strategy failed for query variant");
                    continue;
                }
            };
            for mut doc in docs {
                if results.len() >= k {
                    break;
                }
                let identity = doc.content_identity(500);
                if !seen.insert(identity) {
                    continue;
                }
                doc.set_reserved("retrieval_strategy", "multi_query");
                results.push({
                    doc.set_rank(results.len() as u32 + 1);
                    doc
                });
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

    fn deps_with(documents: Vec<Document>, llm: Arc<dyn LlmClient>) -> Dependencies {
        Dependencies {
            embedder: Arc::new(OpenAiAdapter::stub()),
            llm,
            vector_store: Arc::new(InMemoryVectorStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::new(documents)),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            config: AppConfig::for_tests(),
        }
    }

    #[test]
    fn parses_numbered_list_into_clean_queries() {
        let response = "1. what is bm25 scoring\n2. how does okapi weighting work\n3. term frequency saturation";
        let parsed = parse_query_variations(response, 3);
        assert_eq!(parsed, vec!["what is bm25 scoring", "how does okapi weighting work", "term frequency saturation"]);
    }

    #[tokio::test]
    async fn dedups_documents_surfaced_by_multiple_query_variants() {
        let deps = deps_with(
            vec![Document::new("bm25 uses term frequency and inverse document frequency")],
            Arc::new(FixedLlm("1. what is bm25\n2. explain term frequency")),
        );
        let base = Arc::new(KeywordStrategy::new());
        let strategy = MultiQueryStrategy::new(base);

        let results = strategy.retrieve("bm25 scoring", 5, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results.len(), 1);
    }
}
