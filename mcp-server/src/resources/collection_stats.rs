use serde_json::json;
use serde_json::Value;

use crate::state::McpState;

/// `collection://{name}/stats` — vector-store and document-store stats.
/// The collection name in the URI is informational only; both stores are
/// process-wide singletons, not multi-tenant by collection.
pub async fn stats(state: &McpState, collection_name: &str) -> Value {
    let vector_info = state.deps.vector_store.get_collection_info().await;
    let doc_stats = state.deps.document_store.stats().await;

    match (vector_info, doc_stats) {
        (Ok(vector_info), Ok(doc_stats)) => json!({
            "collection_name": collection_name,
            "vector_store": vector_info,
            "document_store": doc_stats,
            "health_status": "healthy",
            "resource_type": "collection_stats",
        }),
        (vector_result, doc_result) => json!({
            "collection_name": collection_name,
            "vector_store": vector_result.ok(),
            "document_store": doc_result.ok(),
            "health_status": "degraded",
            "resource_type": "collection_stats",
        }),
    }
}

#[cfg(test)]
mod tests {
    use common::model::Document;

    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn healthy_stores_report_healthy_status() {
        let state = test_state(vec![Document::new("a"), Document::new("b")]);

        let response = stats(&state, "documents").await;

        assert_eq!(response["health_status"], "healthy");
        assert_eq!(response["document_store"]["document_count"], 2);
    }
}
