use common::adapters::CacheStats;
use serde_json::{json, Value};

use crate::state::McpState;

fn recommendations(stats: &CacheStats) -> Vec<&'static str> {
    let total = stats.hits + stats.misses;
    let hit_rate = if total == 0 { 0.0 } else { stats.hits as f64 / total as f64 };

    let mut recs = Vec::new();
    if hit_rate < 0.3 {
        recs.push("consider increasing cache TTL for better hit rates");
        recs.push("review query patterns for optimization opportunities");
    }
    if hit_rate > 0.8 {
        recs.push("excellent cache performance - consider expanding cache size");
    }
    if stats.approx_memory_bytes > 100 * 1024 * 1024 {
        recs.push("high memory usage - consider cache cleanup or size limits");
    }
    if recs.is_empty() {
        recs.push("cache performance is within normal parameters");
    }
    recs
}

/// `cache://stats` — hit rate, memory, derived recommendations.
pub async fn stats(state: &McpState) -> Value {
    let stats = state.deps.cache.stats().await;
    let total = stats.hits + stats.misses;
    let hit_rate = if total == 0 { 0.0 } else { stats.hits as f64 / total as f64 };

    json!({
        "cache_stats": stats,
        "performance_summary": {
            "hit_rate_percentage": (hit_rate * 100.0 * 100.0).round() / 100.0,
            "total_operations": total,
            "approx_memory_bytes": stats.approx_memory_bytes,
        },
        "recommendations": recommendations(&stats),
        "resource_type": "cache_stats",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn zero_hit_rate_suggests_increasing_ttl() {
        let state = test_state(vec![]);

        let response = stats(&state).await;

        assert_eq!(response["resource_type"], "cache_stats");
        assert_eq!(
            response["recommendations"][0],
            "consider increasing cache TTL for better hit rates"
        );
    }
}
