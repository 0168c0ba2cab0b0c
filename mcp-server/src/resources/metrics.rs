use serde_json::{json, Value};

use crate::state::McpState;

fn summarize(events: &[common::model::RetrievalMetrics]) -> Value {
    if events.is_empty() {
        return json!({
            "total_requests": 0,
            "avg_latency_ms": 0.0,
            "avg_results_count": 0.0,
            "cache_hit_rate": 0.0,
        });
    }

    let total = events.len();
    let avg_latency = events.iter().map(|e| e.latency_ms as f64).sum::<f64>() / total as f64;
    let avg_results = events.iter().map(|e| e.num_results as f64).sum::<f64>() / total as f64;
    let cache_hits = events.iter().filter(|e| e.cache_hit).count();

    json!({
        "total_requests": total,
        "avg_latency_ms": avg_latency,
        "avg_results_count": avg_results,
        "cache_hit_rate": cache_hits as f64 / total as f64,
    })
}

/// `metrics://{strategy}` — per-strategy performance over everything
/// observed since process start. Unlike the original's mocked time-range
/// buckets, this reads real `InMemoryMetricsSink` history; there is no
/// time-series storage to bucket by `time_range`, so that parameter is not
/// modeled here.
pub async fn for_strategy(state: &McpState, strategy: Option<&str>) -> Value {
    match strategy {
        Some(strategy) => {
            let events = state.metrics.for_strategy(strategy).await;
            json!({
                "strategy": strategy,
                "metrics": summarize(&events),
                "resource_type": "performance_metrics",
            })
        }
        None => {
            let snapshot = state.metrics.snapshot().await;
            let mut by_strategy: std::collections::BTreeMap<String, Vec<common::model::RetrievalMetrics>> = std::collections::BTreeMap::new();
            for event in snapshot {
                by_strategy.entry(event.strategy.clone()).or_default().push(event);
            }
            let all_strategies: Value = by_strategy
                .iter()
                .map(|(name, events)| (name.clone(), summarize(events)))
                .collect::<serde_json::Map<_, _>>()
                .into();

            json!({
                "all_strategies": all_strategies,
                "resource_type": "performance_metrics",
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use common::model::RetrievalMetrics;
    use retrieval_core::metrics::MetricsSink;

    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn buckets_observed_events_by_strategy() {
        let state = test_state(vec![]);
        state
            .metrics
            .emit(RetrievalMetrics {
                strategy: "keyword".to_owned(),
                query: "q".to_owned(),
                num_results: 3,
                latency_ms: 10,
                token_count: None,
                cache_hit: false,
            })
            .await;
        state
            .metrics
            .emit(RetrievalMetrics {
                strategy: "keyword".to_owned(),
                query: "q2".to_owned(),
                num_results: 5,
                latency_ms: 30,
                token_count: None,
                cache_hit: true,
            })
            .await;

        let scoped = for_strategy(&state, Some("keyword")).await;
        assert_eq!(scoped["metrics"]["total_requests"], 2);
        assert_eq!(scoped["metrics"]["cache_hit_rate"], 0.5);

        let all = for_strategy(&state, None).await;
        assert!(all["all_strategies"]["keyword"]["total_requests"] == 2);
    }
}
