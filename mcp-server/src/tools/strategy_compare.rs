use std::time::Instant;

use common::model::RetrievalRequest;
use retrieval_core::factory::{recommend, StrategyFactory};
use retrieval_core::pipeline;
use retrieval_core::StrategyKind;
use serde_json::{json, Value};

use crate::state::McpState;

const COMPARE_PREVIEW_CHARS: usize = 200;
const COMPARE_TOP_N: usize = 3;

async fn run_strategy(state: &McpState, name: &str, question: &str, max_results: usize) -> Value {
    let start = Instant::now();

    let kind = match name.parse::<StrategyKind>() {
        Ok(kind) => kind,
        Err(err) => {
            return json!({
                "strategy": name,
                "success": false,
                "error": err.to_string(),
                "latency_ms": start.elapsed().as_secs_f64() * 1000.0,
            });
        }
    };

    let retriever = StrategyFactory::build(kind);
    let request = RetrievalRequest::new(question, kind.as_str(), max_results);

    match pipeline::retrieve(retriever.as_ref(), &state.deps, &request).await {
        Ok(result) => {
            let documents: Vec<Value> = result
                .documents
                .iter()
                .take(COMPARE_TOP_N)
                .enumerate()
                .map(|(i, doc)| {
                    let preview: String = doc.content.chars().take(COMPARE_PREVIEW_CHARS).collect();
                    json!({ "content": preview, "metadata": doc.metadata, "rank": i + 1 })
                })
                .collect();

            json!({
                "strategy": name,
                "success": true,
                "num_results": result.documents.len(),
                "latency_ms": start.elapsed().as_secs_f64() * 1000.0,
                "documents": documents,
            })
        }
        Err(err) => json!({
            "strategy": name,
            "success": false,
            "error": err.to_string(),
            "latency_ms": start.elapsed().as_secs_f64() * 1000.0,
        }),
    }
}

/// Runs every requested strategy against the same question concurrently
/// and ranks them by latency and result count. Grounded on
/// `tools.strategy_compare`; the recommendation step reuses
/// `retrieval_core::factory::recommend` rather than re-implementing the
/// query-classification heuristic a second time.
pub async fn strategy_compare(state: &McpState, question: &str, strategies: Option<Vec<String>>, max_results: usize) -> Value {
    let start = Instant::now();
    let strategies = strategies.unwrap_or_else(|| StrategyKind::ALL.iter().map(|k| k.as_str().to_owned()).collect());

    let futures = strategies.iter().map(|name| run_strategy(state, name, question, max_results));
    let strategy_results: Vec<Value> = futures::future::join_all(futures).await;

    let successful: Vec<&Value> = strategy_results.iter().filter(|r| r["success"] == true).collect();
    let failed_count = strategy_results.len() - successful.len();

    let mut by_latency = successful.clone();
    by_latency.sort_by(|a, b| {
        a["latency_ms"]
            .as_f64()
            .unwrap_or(f64::MAX)
            .partial_cmp(&b["latency_ms"].as_f64().unwrap_or(f64::MAX))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut by_results = successful.clone();
    by_results.sort_by(|a, b| {
        b["num_results"]
            .as_u64()
            .unwrap_or(0)
            .cmp(&a["num_results"].as_u64().unwrap_or(0))
    });

    let recommendation = recommend(question);
    let successful_names: Vec<&str> = successful.iter().filter_map(|r| r["strategy"].as_str()).collect();
    let (primary, reasoning) = if successful_names.contains(&recommendation.primary.as_str()) {
        (recommendation.primary.as_str().to_owned(), recommendation.reasoning.to_owned())
    } else if let Some(fastest) = by_latency.first() {
        let fastest_name = fastest["strategy"].as_str().unwrap_or("ensemble").to_owned();
        (fastest_name.clone(), format!("fallback to fastest successful strategy: {fastest_name}"))
    } else {
        ("ensemble".to_owned(), "all strategies failed - ensemble provides best fallback coverage".to_owned())
    };

    json!({
        "question": question,
        "strategies_compared": strategies,
        "successful_strategies": successful.len(),
        "failed_strategies": failed_count,
        "performance_rankings": {
            "fastest": by_latency,
            "most_results": by_results,
        },
        "strategy_results": strategy_results,
        "recommendations": {
            "primary": primary,
            "reasoning": reasoning,
            "alternatives": recommendation.alternatives.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "query_type": recommendation.query_type,
        },
        "total_comparison_time_seconds": start.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use common::model::Document;

    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn unknown_strategy_name_fails_without_dragging_down_the_rest() {
        let state = test_state(vec![Document::new("bm25 is a ranking function")]);

        let result = strategy_compare(
            &state,
            "what is bm25",
            Some(vec!["keyword".to_owned(), "not-a-strategy".to_owned()]),
            5,
        )
        .await;

        assert_eq!(result["successful_strategies"], 1);
        assert_eq!(result["failed_strategies"], 1);
        assert!(result["recommendations"]["primary"].as_str().is_some());
    }
}
