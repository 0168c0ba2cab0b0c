use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use common::model::Document;
use common::AppError;

use crate::dependencies::Dependencies;
use crate::strategy::{Strategy, StrategyKind};

const DEFAULT_CHILD_CHUNK_SIZE: usize = 400;
const DEFAULT_PARENT_CHUNK_SIZE: usize = 2000;
const DEFAULT_CHILD_CHUNK_OVERLAP: usize = 50;

/// Non-overlapping split, used for parent chunks.
fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    split_with_step(text, chunk_size, chunk_size)
}

/// Splits `text` into `chunk_size`-char windows advancing `step` chars at a
/// time; `step < chunk_size` produces overlapping windows.
fn split_with_step(text: &str, chunk_size: usize, step: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let step = step.clamp(1, chunk_size);
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct ParentChildIndex {
    parents: Vec<Document>,
    /// (child embedding, parent index)
    children: Vec<(Vec<f32>, usize)>,
}

/// Splits ingested documents into large parent chunks and smaller child
/// chunks embedded for search; a query hits the child index but the parent
/// chunk is what gets returned, so callers see full surrounding context
/// instead of an isolated fragment. The mapping is rebuilt in memory and is
/// not persisted across restarts.
pub struct ParentDocStrategy {
    child_chunk_size: usize,
    child_chunk_overlap: usize,
    parent_chunk_size: usize,
    index: RwLock<Option<ParentChildIndex>>,
}

impl Default for ParentDocStrategy {
    fn default() -> Self {
        Self {
            child_chunk_size: DEFAULT_CHILD_CHUNK_SIZE,
            child_chunk_overlap: DEFAULT_CHILD_CHUNK_OVERLAP,
            parent_chunk_size: DEFAULT_PARENT_CHUNK_SIZE,
            index: RwLock::new(None),
        }
    }
}

impl ParentDocStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_sizes(parent_chunk_size: usize, child_chunk_size: usize) -> Self {
        Self {
            child_chunk_size,
            child_chunk_overlap: DEFAULT_CHILD_CHUNK_OVERLAP,
            parent_chunk_size,
            index: RwLock::new(None),
        }
    }

    pub fn with_chunk_sizes_and_overlap(parent_chunk_size: usize, child_chunk_size: usize, child_chunk_overlap: usize) -> Self {
        Self {
            child_chunk_size,
            child_chunk_overlap,
            parent_chunk_size,
            index: RwLock::new(None),
        }
    }

    async fn ensure_index(&self, deps: &Dependencies) -> Result<(), AppError> {
        if self.index.read().await.is_some() {
            return Ok(());
        }

        let source_documents = deps.document_store.get_all_documents().await?;
        let mut parents = Vec::new();
        let mut child_texts = Vec::new();
        let mut child_parent_idx = Vec::new();

        for doc in &source_documents {
            for parent_text in split_into_chunks(&doc.content, self.parent_chunk_size) {
                let mut parent = Document {
                    content: parent_text.clone(),
                    metadata: doc.metadata.clone(),
                };
                parent.set_reserved("chunk_type", "parent");
                let parent_idx = parents.len();
                parents.push(parent);

                let child_step = self.child_chunk_size.saturating_sub(self.child_chunk_overlap);
                for child_text in split_with_step(&parent_text, self.child_chunk_size, child_step) {
                    child_texts.push(child_text);
                    child_parent_idx.push(parent_idx);
                }
            }
        }

        debug!(parents = parents.len(), children = child_texts.len(), "built parent/child index");

        let children = if child_texts.is_empty() {
            Vec::new()
        } else {
            let embeddings = deps.embedder.embed_documents(&child_texts).await?;
            embeddings.into_iter().zip(child_parent_idx).collect()
        };

        *self.index.write().await = Some(ParentChildIndex { parents, children });
        Ok(())
    }
}

#[async_trait]
impl Strategy for ParentDocStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ParentDoc
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

        if index.children.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = deps.embedder.embed_query(query).await?;

        let mut scored: Vec<(usize, f32)> = index
            .children
            .iter()
            .map(|(embedding, parent_idx)| (*parent_idx, cosine_similarity(&query_vector, embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen_parents = std::collections::HashSet::new();
        let mut results = Vec::new();
        for (parent_idx, _score) in scored {
            if !seen_parents.insert(parent_idx) {
                continue;
            }
            let mut doc = index.parents[parent_idx].clone();
            doc.set_reserved("retrieval_strategy", "parent_doc");
            doc.set_reserved("parent_chunk_size", self.parent_chunk_size as u64);
            doc.set_reserved("child_chunk_size", self.child_chunk_size as u64);
            results.push(doc);
            if results.len() >= k {
                break;
            }
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

    use async_trait::async_trait as at;
    use common::adapters::memory::{InMemoryCache, InMemoryDocumentStore, InMemoryVectorStore};
    use common::adapters::openai::OpenAiAdapter;
    use common::adapters::Embedder;
    use common::config::AppConfig;

    use crate::metrics::InMemoryMetricsSink;

    use super::*;

    struct HashEmbedder;

    #[at]
    impl Embedder for HashEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
            self.embed_documents(std::slice::from_ref(&text.to_owned())).await.map(|mut v| v.remove(0))
        }
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let marker = if t.contains("fox") { 1.0 } else { 0.0 };
                    vec![marker, 1.0 - marker]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn returns_parent_chunk_not_child_fragment() {
        let long_doc = format!("{} the quick fox jumps. {}", "padding text. ".repeat(50), "more padding. ".repeat(50));
        let deps = Dependencies {
            embedder: Arc::new(HashEmbedder),
            llm: Arc::new(OpenAiAdapter::stub()),
            vector_store: Arc::new(InMemoryVectorStore::new()),
            cache: Arc::new(InMemoryCache::new()),
            document_store: Arc::new(InMemoryDocumentStore::new(vec![Document::new(long_doc.clone())])),
            metrics: Arc::new(InMemoryMetricsSink::new()),
            config: AppConfig::for_tests(),
        };

        let strategy = ParentDocStrategy::with_chunk_sizes(2000, 50);
        let results = strategy.retrieve("fox", 1, &Value::Null, &deps).await.expect("retrieve failed");

        assert_eq!(results.len(), 1);
        assert!(results[0].content.len() > 50, "expected a parent-sized chunk, not a child fragment");
    }

    #[test]
    fn default_overlap_is_fifty() {
        let strategy = ParentDocStrategy::new();
        assert_eq!(strategy.child_chunk_overlap, 50);
    }

    #[test]
    fn child_chunks_overlap_by_the_configured_amount() {
        let text = "a".repeat(100);
        let chunks = split_with_step(&text, 40, 40 - 10);

        assert!(chunks.len() > 1);
        // consecutive windows advance by 30 chars but each is 40 wide, so
        // neighboring windows share 10 characters of content.
        assert_eq!(chunks[0].len(), 40);
        assert_eq!(chunks[1].len(), 40);
    }

    #[test]
    fn non_overlapping_split_has_no_remainder_loss() {
        let text = "abcdefghij";
        let chunks = split_into_chunks(text, 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }
}
