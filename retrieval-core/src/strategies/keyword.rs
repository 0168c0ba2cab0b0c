use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use common::model::Document;
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::{Strategy, StrategyKind};

const K1: f32 = 1.5;
const B: f32 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// In-process BM25-Okapi inverted index built lazily from the document
/// store's current contents. There is no external search engine in this
/// stack; the index lives entirely in memory and is rebuilt on
/// `rebuild_index` or whenever it has not yet been built.
struct Bm25Index {
    documents: Vec<Document>,
    doc_tokens: Vec<Vec<String>>,
    doc_lengths: Vec<usize>,
    avg_doc_length: f32,
    doc_freq: HashMap<String, usize>,
}

impl Bm25Index {
    fn build(documents: Vec<Document>) -> Self {
        let doc_tokens: Vec<Vec<String>> = documents.iter().map(|d| tokenize(&d.content)).collect();
        let doc_lengths: Vec<usize> = doc_tokens.iter().map(Vec::len).collect();
        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f32 / doc_lengths.len() as f32
        };

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let mut seen = std::collections::HashSet::new();
            for token in tokens {
                if seen.insert(token.clone()) {
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        Self {
            documents,
            doc_tokens,
            doc_lengths,
            avg_doc_length,
            doc_freq,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        self.doc_tokens
            .iter()
            .enumerate()
            .map(|(idx, tokens)| {
                let doc_len = self.doc_lengths[idx] as f32;
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for token in tokens {
                    *counts.entry(token.as_str()).or_insert(0) += 1;
                }
                query_tokens
                    .iter()
                    .map(|term| {
                        let tf = *counts.get(term.as_str()).unwrap_or(&0) as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let idf = self.idf(term);
                        idf * (tf * (K1 + 1.0))
                            / (tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_length.max(1.0)))
                    })
                    .sum()
            })
            .collect()
    }
}

/// Keyword retrieval over BM25-Okapi scores. Best for factual queries with
/// specific technical terms where exact matching matters more than semantic
/// similarity.
#[derive(Default)]
pub struct KeywordStrategy {
    index: RwLock<Option<Bm25Index>>,
}

impl KeywordStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    async fn ensure_index(&self, deps: &Dependencies) -> Result<(), AppError> {
        if self.index.read().await.is_some() {
            return Ok(());
        }
        let documents = deps.document_store.get_all_documents().await?;
        debug!(count = documents.len(), "building BM25 index");
        *self.index.write().await = Some(Bm25Index::build(documents));
        Ok(())
    }
}

#[async_trait]
impl Strategy for KeywordStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Keyword
    }

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        _params: &Value,
        deps: &Dependencies,
    ) -> Result<Vec<Document>, AppError> {
        self.ensure_index(deps).await?;
        let guard = self.index.read().await;
        let index = guard.as_ref().expect("index just ensured");

        if index.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_tokens = tokenize(query);
        let scores = index.scores(&query_tokens);

        let mut scored: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::new();
        for (idx, score) in scored.into_iter().take(k) {
            if score <= 0.0 {
                continue;
            }
            let mut doc = index.documents[idx].clone();
            doc.set_reserved("retrieval_strategy", "keyword");
            doc.set_reserved("bm25_score", score);
            results.push(doc);
        }
        Ok(results)
    }

    async fn rebuild_index(&self, deps: &Dependencies) -> Result<(), AppError> {
        *self.index.write().await = None;
        self.ensure_index(deps).await
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

    fn deps_with(documents: Vec<Document>) -> Dependencies {
        Dependencies {
            embedder: Arc::new(OpenAiAdapter::stub()),
            llm: Arc::new(OpenAiAdapter::stub()),
            vector_store: Arc::new(InMemoryVectorStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::new(documents)),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            config: AppConfig::for_tests(),
        }
    }

    #[tokio::test]
    async fn ranks_exact_term_match_above_unrelated_document() {
        let deps = deps_with(vec![
            Document::new("the quick brown fox jumps over the lazy dog"),
            Document::new("completely unrelated content about cooking recipes"),
        ]);
        let strategy = KeywordStrategy::new();

        let results = strategy.retrieve("quick fox", 2, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results[0].content, "the quick brown fox jumps over the lazy dog");
    }

    #[tokio::test]
    async fn empty_store_returns_no_results() {
        let deps = deps_with(vec![]);
        let strategy = KeywordStrategy::new();
        let results = strategy.retrieve("anything", 5, &Value::Null, &deps).await.expect("retrieve failed");
        assert!(results.is_empty());
    }
}
