use std::time::Instant;

use serde_json::Value;
use tracing::{info, instrument, warn};

use common::model::{RetrievalMetrics, RetrievalRequest, RetrievalResult};
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::Strategy;

/// Every public retrieval call goes through this wrapper, never a bare
/// `Strategy::retrieve`: cache lookup, deadline enforcement, result
/// truncation/rank-stamping, cache write-back and metrics emission all
/// happen exactly once here instead of being duplicated per strategy.
#[instrument(skip(strategy, deps, request), fields(strategy = %request.strategy_name, k = request.k))]
pub async fn retrieve(
    strategy: &dyn Strategy,
    deps: &Dependencies,
    request: &RetrievalRequest,
) -> Result<RetrievalResult, AppError> {
    let cache_key = request.cache_key();
    let started = Instant::now();

    if let Some(cached) = deps.cache.get(&cache_key).await {
        if let Ok(result) = serde_json::from_slice::<RetrievalResult>(&cached) {
            let metrics = RetrievalMetrics {
                strategy: request.strategy_name.clone(),
                query: request.query.clone(),
                num_results: result.len(),
                latency_ms: started.elapsed().as_millis() as u64,
                token_count: Some(0),
                cache_hit: true,
            };
            deps.metrics.emit(metrics).await;
            info!(cache_hit = true, num_results = result.len(), "retrieval served from cache");
            return Ok(result);
        }
        warn!("cache entry for {cache_key} failed to deserialize, falling through to strategy");
    }

    let timeout = deps.config.strategy_timeout();
    let params = if request.params.is_null() {
        &Value::Null
    } else {
        &request.params
    };

    let outcome = tokio::time::timeout(timeout, strategy.retrieve(&request.query, request.k, params, deps)).await;

    let documents = match outcome {
        Ok(Ok(documents)) => documents,
        Ok(Err(err)) => {
            warn!(error = %err, "strategy returned an error");
            let metrics = RetrievalMetrics {
                strategy: request.strategy_name.clone(),
                query: request.query.clone(),
                num_results: 0,
                latency_ms: started.elapsed().as_millis() as u64,
                token_count: Some(0),
                cache_hit: false,
            };
            deps.metrics.emit(metrics).await;
            return Err(err);
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "strategy timed out");
            let metrics = RetrievalMetrics {
                strategy: request.strategy_name.clone(),
                query: request.query.clone(),
                num_results: 0,
                latency_ms: started.elapsed().as_millis() as u64,
                token_count: Some(0),
                cache_hit: false,
            };
            deps.metrics.emit(metrics).await;
            return Err(AppError::Timeout(format!(
                "strategy '{}' exceeded {}ms",
                request.strategy_name,
                timeout.as_millis()
            )));
        }
    };

    let result = RetrievalResult::new(documents, request.k);

    if let Ok(encoded) = serde_json::to_vec(&result) {
        deps.cache.set(&cache_key, encoded, deps.config.cache_ttl()).await;
    }

    let token_count = result.documents.iter().map(|d| d.content.split_whitespace().count()).sum();

    let metrics = RetrievalMetrics {
        strategy: request.strategy_name.clone(),
        query: request.query.clone(),
        num_results: result.len(),
        latency_ms: started.elapsed().as_millis() as u64,
        token_count: Some(token_count),
        cache_hit: false,
    };
    deps.metrics.emit(metrics).await;
    info!(num_results = result.len(), "retrieval completed");

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::adapters::memory::{InMemoryCache, InMemoryDocumentStore, InMemoryVectorStore};
    use common::adapters::openai::OpenAiAdapter;
    use common::config::AppConfig;
    use common::model::Document;

    use crate::metrics::InMemoryMetricsSink;
    use crate::strategy::StrategyKind;

    use super::*;

    struct CountingStrategy {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Strategy for CountingStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Keyword
        }

        async fn retrieve(
            &self,
            _query: &str,
            _k: usize,
            _params: &Value,
            _deps: &Dependencies,
        ) -> Result<Vec<Document>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Document::new("a"), Document::new("b"), Document::new("c")])
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
    async fn truncates_to_k_and_stamps_contiguous_ranks() {
        let deps = test_deps();
        let strategy = CountingStrategy { calls: AtomicUsize::new(0) };
        let request = RetrievalRequest::new("q", "keyword", 2);

        let result = retrieve(&strategy, &deps, &request).await.expect("retrieve failed");

        assert_eq!(result.len(), 2);
        assert_eq!(result.documents[0].rank(), Some(1));
        assert_eq!(result.documents[1].rank(), Some(2));
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache_without_invoking_strategy() {
        let deps = test_deps();
        let strategy = CountingStrategy { calls: AtomicUsize::new(0) };
        let request = RetrievalRequest::new("q", "keyword", 2);

        retrieve(&strategy, &deps, &request).await.expect("first call failed");
        retrieve(&strategy, &deps, &request).await.expect("second call failed");

        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
    }
}
