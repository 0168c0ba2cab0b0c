use retrieval_core::factory::recommend;
use retrieval_core::StrategyKind;
use serde_json::{json, Value};

/// `strategies://info` — a static catalog, not a call into any live
/// strategy; good enough to stay a plain function of no arguments.
pub fn info() -> Value {
    let available: Vec<&str> = StrategyKind::ALL.iter().map(|k| k.as_str()).collect();

    let samples = [
        ("what is bm25", "keyword"),
        ("explain how distributed consensus works", "ensemble"),
        ("the api throws a null pointer exception in this function", "keyword"),
    ];
    let query_analyses: Vec<Value> = samples
        .iter()
        .map(|(q, _)| {
            let rec = recommend(q);
            json!({ "example_query": q, "recommended": rec.primary.as_str(), "query_type": rec.query_type })
        })
        .collect();

    json!({
        "available_strategies": available,
        "recommendations": {
            "factual_queries": "keyword",
            "conceptual_queries": "vector",
            "technical_queries": "parent_doc",
            "comprehensive_research": "ensemble",
            "high_precision": "rerank",
            "broad_coverage": "multi_query",
        },
        "performance_characteristics": {
            "fastest": ["keyword", "vector"],
            "most_accurate": ["rerank", "ensemble"],
            "best_context": ["parent_doc", "multi_query"],
            "balanced": ["ensemble", "vector"],
        },
        "auto_selection_examples": query_analyses,
        "resource_type": "strategy_info",
    })
}
