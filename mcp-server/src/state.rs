use std::sync::Arc;

use retrieval_core::metrics::InMemoryMetricsSink;
use retrieval_core::Dependencies;

/// Everything the tool/resource handlers need, analogous to the teacher's
/// `ApiState`. `metrics` is kept as a concrete `Arc` alongside
/// `deps.metrics` (a `dyn MetricsSink` there) so the `metrics://` resource
/// can read back what strategies have emitted.
#[derive(Clone)]
pub struct McpState {
    pub deps: Dependencies,
    pub metrics: Arc<InMemoryMetricsSink>,
}

impl McpState {
    pub fn new(deps: Dependencies, metrics: Arc<InMemoryMetricsSink>) -> Self {
        Self { deps, metrics }
    }
}

#[cfg(test)]
pub fn test_state(documents: Vec<common::model::Document>) -> McpState {
    use common::adapters::memory::{InMemoryCache, InMemoryDocumentStore, InMemoryVectorStore};
    use common::adapters::openai::OpenAiAdapter;
    use common::config::AppConfig;

    let llm = Arc::new(OpenAiAdapter::stub());
    let metrics = Arc::new(InMemoryMetricsSink::new());

    McpState::new(
        Dependencies {
            embedder: llm.clone(),
            llm,
            vector_store: Arc::new(InMemoryVectorStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::new(documents)),
            metrics: metrics.clone(),
            config: AppConfig::for_tests(),
        },
        metrics,
    )
}
