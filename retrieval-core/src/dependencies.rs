use std::sync::Arc;

use common::adapters::{Cache, DocumentStore, Embedder, LlmClient, VectorStore};
use common::config::AppConfig;

use crate::metrics::MetricsSink;

/// Everything a strategy needs to do its work, built once during startup
/// (per spec.md §9: "lazy singletons -> explicit initialization phase").
/// Tests construct this with the in-memory adapters from
/// `common::adapters::memory`; production wires in real backends.
#[derive(Clone)]
pub struct Dependencies {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmClient>,
    pub vector_store: Arc<dyn VectorStore>,
    pub cache: Arc<dyn Cache>,
    pub document_store: Arc<dyn DocumentStore>,
    pub metrics: Arc<dyn MetricsSink>,
    pub config: AppConfig,
}
