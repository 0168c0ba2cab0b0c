use std::time::Instant;

use retrieval_core::factory::StrategyFactory;
use retrieval_core::pipeline;
use serde_json::{json, Value};

use common::model::RetrievalRequest;

use crate::state::McpState;
use crate::tools::synthesize_answer;

const SOURCE_PREVIEW_CHARS: usize = 500;

/// Full RAG pipeline: resolve strategy, retrieve, synthesize an answer over
/// the retrieved documents, optionally score it with the quality evaluator.
/// Grounded on the original `tools.research_deep` command, minus the
/// DeepAgents orchestration layer (out of scope here) which that command
/// delegated to for the "agent.arun" step.
pub async fn research_deep(
    state: &McpState,
    question: &str,
    strategy: &str,
    max_results: usize,
    include_sources: bool,
    enable_evaluation: bool,
) -> Value {
    let start = Instant::now();

    let kind = match StrategyFactory::resolve(strategy, question) {
        Ok(kind) => kind,
        Err(err) => {
            return json!({
                "error": err.to_string(),
                "question": question,
                "strategy_attempted": strategy,
                "processing_time_seconds": start.elapsed().as_secs_f64(),
            });
        }
    };

    let retriever = StrategyFactory::build(kind);
    let request = RetrievalRequest::new(question, kind.as_str(), max_results);

    let result = match pipeline::retrieve(retriever.as_ref(), &state.deps, &request).await {
        Ok(result) => result,
        Err(err) => {
            return json!({
                "error": err.to_string(),
                "question": question,
                "strategy_attempted": strategy,
                "processing_time_seconds": start.elapsed().as_secs_f64(),
            });
        }
    };

    let answer = synthesize_answer(state, question, &result.documents).await;

    let mut response = json!({
        "answer": answer.clone(),
        "question": question,
        "strategy_used": kind.as_str(),
        "num_sources": result.documents.len(),
        "processing_time_seconds": start.elapsed().as_secs_f64(),
    });

    if include_sources && !result.documents.is_empty() {
        let sources: Vec<Value> = result
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let preview: String = doc.content.chars().take(SOURCE_PREVIEW_CHARS).collect();
                json!({
                    "content": preview,
                    "metadata": doc.metadata,
                    "rank": i + 1,
                })
            })
            .collect();
        response["sources"] = Value::Array(sources);
    }

    if enable_evaluation && !result.documents.is_empty() {
        let sample = common::model::EvalSample {
            question: question.to_owned(),
            answer: answer.clone(),
            contexts: result.documents.iter().map(|d| d.content.clone()).collect(),
            ground_truth: None,
        };
        let scores = eval::evaluate_sample(&state.deps.llm, &sample).await;
        response["ragas_scores"] = json!(scores);
    }

    response
}

#[cfg(test)]
mod tests {
    use common::model::Document;

    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn keyword_strategy_returns_answer_and_sources() {
        let state = test_state(vec![
            Document::new("rust ownership prevents data races at compile time"),
            Document::new("python uses a global interpreter lock"),
        ]);

        let response = research_deep(&state, "rust ownership", "keyword", 5, true, false).await;

        assert!(response.get("error").is_none());
        assert_eq!(response["strategy_used"], "keyword");
        assert!(response["sources"].as_array().is_some());
    }

    #[tokio::test]
    async fn unknown_strategy_reports_error_without_panicking() {
        let state = test_state(vec![]);

        let response = research_deep(&state, "anything", "not-a-strategy", 5, false, false).await;

        assert!(response["error"].as_str().is_some());
        assert_eq!(response["strategy_attempted"], "not-a-strategy");
    }
}
