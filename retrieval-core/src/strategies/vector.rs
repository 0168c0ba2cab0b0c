use async_trait::async_trait;
use serde_json::Value;

use common::model::Document;
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::{Strategy, StrategyKind};

/// Dense vector similarity search over embeddings, via whatever
/// `VectorStore` was wired into `Dependencies`. Best for conceptual
/// questions where the right passage may not share vocabulary with the
/// query.
#[derive(Default)]
pub struct VectorStrategy {
    similarity_threshold: f32,
}

impl VectorStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(similarity_threshold: f32) -> Self {
        Self { similarity_threshold }
    }
}

#[async_trait]
impl Strategy for VectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        params: &Value,
        deps: &Dependencies,
    ) -> Result<Vec<Document>, AppError> {
        let threshold = params
            .get("similarity_threshold")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(self.similarity_threshold);

        let query_vector = deps.embedder.embed_query(query).await?;
        let scored = deps.vector_store.similarity_search_with_score(&query_vector, k).await?;

        let mut results = Vec::new();
        for (mut doc, score) in scored {
            if score < threshold {
                continue;
            }
            doc.set_reserved("retrieval_strategy", "vector");
            doc.set_reserved("similarity_score", score);
            results.push(doc);
        }
        Ok(results)
    }

    async fn add_documents(&self, docs: Vec<Document>, deps: &Dependencies) -> Result<(), AppError> {
        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let embeddings = deps.embedder.embed_documents(&texts).await?;
        deps.vector_store.add(docs.into_iter().zip(embeddings).collect()).await
    }

    async fn delete_documents(&self, ids: &[String], deps: &Dependencies) -> Result<(), AppError> {
        deps.vector_store.delete(ids).await
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

    #[tokio::test]
    async fn similarity_threshold_filters_low_scoring_documents() {
        let vector_store = InMemoryVectorStore::with_entries(vec![
            (Document::new("a"), vec![1.0, 0.0]),
            (Document::new("b"), vec![0.0, 1.0]),
        ]);

        struct FixedEmbedder;
        #[async_trait]
        impl common::adapters::Embedder for FixedEmbedder {
            async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, AppError> {
                Ok(vec![1.0, 0.0])
            }
            async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        let deps = Dependencies {
            embedder: Arc::new(FixedEmbedder),
            llm: Arc::new(OpenAiAdapter::stub()),
            vector_store: Arc::new(vector_store),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::default()),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            config: AppConfig::for_tests(),
        };

        let strategy = VectorStrategy::with_threshold(0.9);
        let results = strategy.retrieve("q", 2, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "a");
    }
}
