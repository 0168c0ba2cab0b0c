use std::time::Instant;

use common::adapters::memory::JsonlGoldenDatasetLoader;
use common::adapters::GoldenDatasetLoader;
use common::model::{EvalSample, RetrievalRequest};
use retrieval_core::factory::StrategyFactory;
use retrieval_core::pipeline;
use serde_json::{json, Value};

use crate::state::McpState;
use crate::tools::synthesize_answer;

/// Evaluates a retrieval strategy against the configured golden dataset:
/// retrieve + synthesize an answer per question, then score the four
/// reference-free rubrics. Grounded on `eval/harness.py`'s
/// `RAGASEvaluator.evaluate_dataset`, minus the on-disk results archive
/// (`_save_results`) which has no equivalent surface in this server.
pub async fn evaluate_rag(state: &McpState, strategy: &str, num_test_cases: usize, output_format: &str) -> Value {
    let start = Instant::now();

    let Some(path) = state.deps.config.golden_dataset_path.as_deref() else {
        return json!({
            "error": "no golden dataset configured (set golden_dataset_path)",
            "strategy": strategy,
            "evaluation_time_seconds": start.elapsed().as_secs_f64(),
        });
    };

    let loader = JsonlGoldenDatasetLoader;
    let dataset = match loader.load(Some(path), Some(num_test_cases)).await {
        Ok(dataset) if !dataset.is_empty() => dataset,
        Ok(_) => {
            return json!({
                "error": "golden dataset is empty",
                "suggestion": "add test cases to the configured golden dataset file",
            });
        }
        Err(err) => {
            return json!({
                "error": err.to_string(),
                "strategy": strategy,
                "evaluation_time_seconds": start.elapsed().as_secs_f64(),
            });
        }
    };

    let kind = match StrategyFactory::resolve(strategy, "") {
        Ok(kind) => kind,
        Err(err) => {
            return json!({
                "error": err.to_string(),
                "strategy": strategy,
                "evaluation_time_seconds": start.elapsed().as_secs_f64(),
            });
        }
    };
    let retriever = StrategyFactory::build(kind);

    let mut samples = Vec::with_capacity(dataset.len());
    for golden in &dataset {
        let request = RetrievalRequest::new(golden.question.clone(), kind.as_str(), 5);
        let contexts = match pipeline::retrieve(retriever.as_ref(), &state.deps, &request).await {
            Ok(result) => result.documents.iter().map(|d| d.content.clone()).collect(),
            Err(_) => Vec::new(),
        };
        let answer = if contexts.is_empty() {
            "No relevant information found.".to_owned()
        } else {
            let docs: Vec<common::model::Document> = contexts.iter().map(|c| common::model::Document::new(c.clone())).collect();
            synthesize_answer(state, &golden.question, &docs).await
        };

        samples.push(EvalSample {
            question: golden.question.clone(),
            answer,
            contexts,
            ground_truth: golden.ground_truth.clone(),
        });
    }

    let report = match eval::evaluate_batch(&state.deps.llm, &samples).await {
        Ok(report) => report,
        Err(err) => {
            return json!({
                "error": err.to_string(),
                "strategy": strategy,
                "evaluation_time_seconds": start.elapsed().as_secs_f64(),
            });
        }
    };

    let elapsed = start.elapsed().as_secs_f64();

    match output_format {
        "detailed" => json!({
            "strategy": strategy,
            "summary": report.aggregate,
            "detailed_results": report.per_sample,
            "evaluation_time_seconds": elapsed,
        }),
        "json" => json!(report),
        _ => json!({
            "strategy": strategy,
            "test_cases": report.num_samples,
            "overall_score": report.aggregate.overall_score,
            "metrics": {
                "answer_relevancy": report.aggregate.answer_relevancy,
                "context_precision": report.aggregate.context_precision,
                "context_recall": report.aggregate.context_recall,
                "faithfulness": report.aggregate.faithfulness,
            },
            "evaluation_time_seconds": elapsed,
        }),
    }
}
