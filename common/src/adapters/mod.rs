pub mod memory;
pub mod openai;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::{Document, EvalSample};

/// `embed_query`/`embed_documents` must be deterministic for a given model
/// version: the same text embeds to the same vector every call.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError>;
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

/// Temperature is the caller's choice: 0.0 for reranking/query-expansion
/// (deterministic extraction), ~0.1 for evaluation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_count: usize,
    pub dimension: Option<usize>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search_with_score(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>, AppError>;
    async fn add(&self, docs: Vec<(Document, Vec<f32>)>) -> Result<(), AppError>;
    async fn delete(&self, ids: &[String]) -> Result<(), AppError>;
    async fn get_collection_info(&self) -> Result<CollectionInfo, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub approx_memory_bytes: u64,
}

/// Every method here degrades silently: a cache that is down must never
/// fail the retrieval it is asked to speed up. `get` returns `None` on any
/// failure (indistinguishable from a miss); `set`/`delete`/`clear_pattern`
/// are fire-and-forget.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete(&self, key: &str);
    async fn clear_pattern(&self, glob: &str);
    async fn stats(&self) -> CacheStats;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentStoreStats {
    pub document_count: usize,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all_documents(&self) -> Result<Vec<Document>, AppError>;
    async fn add_documents(&self, docs: Vec<Document>) -> Result<(), AppError>;
    async fn remove(&self, id: &str) -> Result<(), AppError>;
    async fn stats(&self) -> Result<DocumentStoreStats, AppError>;
}

#[async_trait]
pub trait GoldenDatasetLoader: Send + Sync {
    async fn load(&self, path: Option<&str>, limit: Option<usize>) -> Result<Vec<EvalSample>, AppError>;
}
