use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Metadata keys only the retrieval engine itself is allowed to write.
/// Everything else in a `Document`'s metadata is ingestion-owned and must
/// be preserved verbatim as it passes through a strategy.
pub const RESERVED_METADATA_KEYS: &[&str] = &[
    "retrieval_strategy",
    "rank",
    "similarity_score",
    "bm25_score",
    "rrf_score",
    "contributing_strategies",
    "rerank_score",
    "chunk_type",
    "parent_document_id",
    "parent_chunk_size",
    "child_chunk_size",
];

/// An opaque textual payload plus a key->value metadata mapping. Documents
/// are externally owned; the retrieval engine only borrows and annotates
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach ingestion-owned metadata. Panics in debug builds if `key` is
    /// one of the reserved keys the engine writes itself; ingestion code
    /// should never collide with those.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        debug_assert!(
            !RESERVED_METADATA_KEYS.contains(&key.as_str()),
            "ingestion metadata must not use reserved key '{key}'"
        );
        self.metadata.insert(key, value.into());
        self
    }

    /// Write one of the engine-reserved metadata keys. Strategies must use
    /// this instead of touching `metadata` directly so ingestion metadata
    /// can never be clobbered by accident.
    pub fn set_reserved(&mut self, key: &str, value: impl Into<Value>) {
        debug_assert!(
            RESERVED_METADATA_KEYS.contains(&key),
            "'{key}' is not a reserved metadata key"
        );
        self.metadata.insert(key.to_owned(), value.into());
    }

    pub fn rank(&self) -> Option<u32> {
        self.metadata.get("rank").and_then(Value::as_u64).map(|r| r as u32)
    }

    pub fn set_rank(&mut self, rank: u32) {
        self.set_reserved("rank", rank);
    }

    /// Stable identity over the first `n` characters of content, used for
    /// dedup where the full document need not match (e.g. multi-query
    /// merging paraphrased-variant hits of the same underlying passage).
    pub fn content_identity(&self, chars: usize) -> String {
        let prefix: String = self.content.chars().take(chars).collect();
        hex_sha256(prefix.as_bytes())
    }

    /// Identity combining a content prefix with `metadata.source`, used by
    /// ensemble fusion so the same passage retrieved under two different
    /// sources is not silently merged.
    pub fn fusion_identity(&self, chars: usize) -> String {
        let prefix: String = self.content.chars().take(chars).collect();
        let source = self
            .metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        hex_sha256(format!("{source}\u{0}{prefix}").as_bytes())
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// A user-supplied search string. Non-emptiness and length bounds are the
/// consumer's responsibility, not the engine's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query(pub String);

impl Deref for Query {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Query {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Query {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub strategy_name: String,
    pub k: usize,
    #[serde(default)]
    pub params: Value,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, strategy_name: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            strategy_name: strategy_name.into(),
            k: k.max(1),
            params: Value::Null,
        }
    }

    /// Stable cache key over `(strategy, query, k)`. Uses SHA-256 over the
    /// exact query bytes so the key is reproducible across process
    /// restarts when the cache is shared externally.
    pub fn cache_key(&self) -> String {
        let digest = hex_sha256(self.query.as_bytes());
        format!("retrieval:{}:{}:{}", self.strategy_name, digest, self.k)
    }
}

/// Ordered sequence of at most `k` documents, each carrying a 1-based,
/// contiguous `rank` matching its position.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetrievalResult {
    pub documents: Vec<Document>,
}

impl RetrievalResult {
    pub fn new(mut documents: Vec<Document>, k: usize) -> Self {
        documents.truncate(k);
        for (idx, doc) in documents.iter_mut().enumerate() {
            doc.set_rank(idx as u32 + 1);
        }
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub strategy: String,
    pub query: String,
    pub num_results: usize,
    pub latency_ms: u64,
    pub token_count: Option<usize>,
    pub cache_hit: bool,
}

/// One reference-free evaluation case: a question, the answer produced for
/// it, the contexts retrieved in support of that answer, and optionally a
/// ground-truth answer used only by `context_recall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSample {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: Option<String>,
}

/// Four-metric LLM-rubric score for one `EvalSample`. `overall_score` is
/// the unweighted mean of the other four.
///
/// `context_recall` falls back to scoring contexts against `answer` when
/// `ground_truth` is absent. That makes the metric partially self-referential
/// (the answer is being checked against the contexts it was itself derived
/// from) and biases it upward; this is a known, intentionally-kept
/// limitation rather than a bug — do not silently "fix" it by inventing a
/// ground truth.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RagasScores {
    pub answer_relevancy: f32,
    pub context_precision: f32,
    pub context_recall: f32,
    pub faithfulness: f32,
    pub overall_score: f32,
}

impl RagasScores {
    pub fn new(answer_relevancy: f32, context_precision: f32, context_recall: f32, faithfulness: f32) -> Self {
        let overall_score =
            (answer_relevancy + context_precision + context_recall + faithfulness) / 4.0;
        Self {
            answer_relevancy,
            context_precision,
            context_recall,
            faithfulness,
            overall_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let a = RetrievalRequest::new("what is bm25", "keyword", 5);
        let b = RetrievalRequest::new("what is bm25", "keyword", 5);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_differs_on_k() {
        let a = RetrievalRequest::new("what is bm25", "keyword", 5);
        let b = RetrievalRequest::new("what is bm25", "keyword", 6);
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn retrieval_result_stamps_contiguous_ranks() {
        let docs = vec![Document::new("a"), Document::new("b"), Document::new("c")];
        let result = RetrievalResult::new(docs, 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result.documents[0].rank(), Some(1));
        assert_eq!(result.documents[1].rank(), Some(2));
    }

    #[test]
    fn ragas_overall_is_unweighted_mean() {
        let scores = RagasScores::new(1.0, 0.5, 0.0, 0.5);
        assert!((scores.overall_score - 0.5).abs() < f32::EPSILON);
    }
}
