//! Hermetic in-memory adapters. These back every unit/integration test in
//! the workspace and are the default wiring for `retriever://` resource
//! handlers when no external vector store/cache is configured.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Cache, CacheStats, CollectionInfo, DocumentStore, DocumentStoreStats, GoldenDatasetLoader, VectorStore};
use crate::error::AppError;
use crate::model::{Document, EvalSample};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<Vec<Document>>,
}

impl InMemoryDocumentStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_all_documents(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.documents.read().await.clone())
    }

    async fn add_documents(&self, docs: Vec<Document>) -> Result<(), AppError> {
        self.documents.write().await.extend(docs);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), AppError> {
        self.documents
            .write()
            .await
            .retain(|doc| doc.metadata.get("id").and_then(Value::as_str) != Some(id));
        Ok(())
    }

    async fn stats(&self) -> Result<DocumentStoreStats, AppError> {
        Ok(DocumentStoreStats {
            document_count: self.documents.read().await.len(),
        })
    }
}

/// Brute-force cosine-similarity search. Fine for tests and small
/// collections; production deployments swap in a real vector database
/// behind the same `VectorStore` trait.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<(Document, Vec<f32>)>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search_with_score(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>, AppError> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(Document, f32)> = entries
            .iter()
            .map(|(doc, emb)| (doc.clone(), cosine_similarity(vector, emb)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn add(&self, docs: Vec<(Document, Vec<f32>)>) -> Result<(), AppError> {
        self.entries.write().await.extend(docs);
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        entries.retain(|(doc, _)| {
            doc.metadata
                .get("id")
                .and_then(Value::as_str)
                .is_none_or(|id| !ids.iter().any(|target| target == id))
        });
        Ok(())
    }

    async fn get_collection_info(&self) -> Result<CollectionInfo, AppError> {
        let entries = self.entries.read().await;
        let dimension = entries.first().map(|(_, emb)| emb.len());
        Ok(CollectionInfo {
            name: "in_memory".to_owned(),
            vector_count: entries.len(),
            dimension,
        })
    }
}

struct CacheRecord {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheRecord>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(record) if record.expires_at > Instant::now() => {
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Some(record.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_owned(),
            CacheRecord {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn clear_pattern(&self, glob: &str) {
        let prefix = glob.trim_end_matches('*');
        self.entries.write().await.retain(|key, _| !key.starts_with(prefix));
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
            entries: entries.len() as u64,
            approx_memory_bytes: entries.values().map(|r| r.value.len() as u64).sum(),
        }
    }
}

/// Loads a golden dataset from a JSONL file, one `EvalSample` per line. No
/// hard-coded fallback dataset: when `path` is `None` the caller (the
/// evaluator) is expected to have already turned that into a
/// `config_error`, per the deliberate decision in DESIGN.md.
#[derive(Default)]
pub struct JsonlGoldenDatasetLoader;

#[async_trait]
impl GoldenDatasetLoader for JsonlGoldenDatasetLoader {
    async fn load(&self, path: Option<&str>, limit: Option<usize>) -> Result<Vec<EvalSample>, AppError> {
        let path = path.ok_or_else(|| AppError::Config("no golden dataset path configured".into()))?;
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Config(format!("reading golden dataset {path}: {e}")))?;

        let mut samples = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let sample: EvalSample = serde_json::from_str(line)
                .map_err(|e| AppError::Config(format!("parsing golden dataset line: {e}")))?;
            samples.push(sample);
            if limit.is_some_and(|limit| samples.len() >= limit) {
                break;
            }
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_miss_after_ttl_elapses() {
        let cache = InMemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(10)).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn vector_store_orders_by_similarity_desc() {
        let store = InMemoryVectorStore::with_entries(vec![
            (Document::new("a"), vec![1.0, 0.0]),
            (Document::new("b"), vec![0.0, 1.0]),
        ]);
        let results = store
            .similarity_search_with_score(&[1.0, 0.0], 2)
            .await
            .expect("search failed");
        assert_eq!(results[0].0.content, "a");
        assert!(results[0].1 > results[1].1);
    }

    #[tokio::test]
    async fn empty_document_store_returns_empty_stats() {
        let store = InMemoryDocumentStore::default();
        let stats = store.stats().await.expect("stats failed");
        assert_eq!(stats.document_count, 0);
    }
}
