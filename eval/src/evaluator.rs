use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use common::adapters::LlmClient;
use common::model::{EvalSample, RagasScores};
use common::AppError;

/// Score returned when an LLM judgment fails to parse or the call itself
/// errors. A neutral middle value rather than zero, so one malformed reply
/// does not tank a batch average; any production consumer of these scores
/// should also check `num_failed` in `BatchEvalReport` rather than trusting
/// the mean alone.
const FALLBACK_SCORE: f32 = 0.5;
const CONTEXT_PREVIEW_CHARS: usize = 500;
const MAX_CONTEXTS_SHOWN: usize = 5;

fn context_block(contexts: &[String]) -> String {
    contexts
        .iter()
        .take(MAX_CONTEXTS_SHOWN)
        .enumerate()
        .map(|(i, c)| {
            let preview: String = c.chars().take(CONTEXT_PREVIEW_CHARS).collect();
            format!("Context {}: {}", i + 1, preview)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Extracts the first decimal number in the reply, accepting a
/// comma-as-decimal-separator ("0,8") the same way the LLM sometimes
/// produces, then clamps to `[0.0, 1.0]`. Falls back to `FALLBACK_SCORE` on
/// any parse failure rather than propagating an error — a rubric judgment
/// call is inherently noisy and should degrade, not abort a batch.
fn parse_rubric_score(response: &str) -> f32 {
    let Some(first_token) = response.trim().split_whitespace().next() else {
        return FALLBACK_SCORE;
    };
    let normalized = first_token.replace(',', ".");
    let trimmed: String = normalized.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    trimmed.parse::<f32>().map_or(FALLBACK_SCORE, |score| score.clamp(0.0, 1.0))
}

async fn judge(llm: &dyn LlmClient, prompt: &str, metric: &str) -> f32 {
    match llm.complete(prompt, 0.0).await {
        Ok(response) => parse_rubric_score(&response),
        Err(err) => {
            warn!(metric, error = %err, "LLM judgment call failed, using fallback score");
            FALLBACK_SCORE
        }
    }
}

fn answer_relevancy_prompt(question: &str, answer: &str) -> String {
    format!(
        "Evaluate how relevant this answer is to the question.\n\n\
         Question: {question}\n\nAnswer: {answer}\n\n\
         Rate the relevancy on a scale of 0.0 to 1.0 where 1.0 is perfectly relevant and \
         directly answers the question, and values below 0.6 indicate poor relevance or an \
         off-topic answer.\n\nProvide only a decimal number between 0.0 and 1.0."
    )
}

fn context_precision_prompt(question: &str, contexts: &[String]) -> String {
    format!(
        "Evaluate the precision of retrieved contexts for answering this question.\n\n\
         Question: {question}\n\nRetrieved Contexts:\n{}\n\n\
         Rate the precision on a scale of 0.0 to 1.0: how much of the retrieved information is \
         actually useful for answering the question.\n\nProvide only a decimal number between 0.0 and 1.0.",
        context_block(contexts)
    )
}

/// When `ground_truth` is absent this checks the contexts against the
/// generated `answer` instead, per [`common::model::RagasScores`]'s
/// documented self-referential-bias limitation.
fn context_recall_prompt(question: &str, answer: &str, contexts: &[String], ground_truth: Option<&str>) -> String {
    let reference = ground_truth.unwrap_or(answer);
    format!(
        "Evaluate whether the retrieved contexts contain all necessary information.\n\n\
         Question: {question}\n\nExpected information: {reference}\n\nRetrieved Contexts:\n{}\n\n\
         Rate the recall on a scale of 0.0 to 1.0: how much of the necessary information is \
         present in the contexts.\n\nProvide only a decimal number between 0.0 and 1.0.",
        context_block(contexts)
    )
}

fn faithfulness_prompt(answer: &str, contexts: &[String]) -> String {
    format!(
        "Evaluate the faithfulness of this answer to the provided contexts.\n\n\
         Answer: {answer}\n\nSource Contexts:\n{}\n\n\
         Rate the faithfulness on a scale of 0.0 to 1.0: whether the answer invents information \
         not present in the contexts. 1.0 means every statement is directly supported.\n\n\
         Provide only a decimal number between 0.0 and 1.0.",
        context_block(contexts)
    )
}

/// Scores one `(question, answer, contexts)` triple against the four
/// reference-free rubrics, each an independent LLM judgment call.
pub async fn evaluate_sample(llm: &Arc<dyn LlmClient>, sample: &EvalSample) -> RagasScores {
    let relevancy = judge(llm.as_ref(), &answer_relevancy_prompt(&sample.question, &sample.answer), "answer_relevancy").await;
    let precision = judge(llm.as_ref(), &context_precision_prompt(&sample.question, &sample.contexts), "context_precision").await;
    let recall = judge(
        llm.as_ref(),
        &context_recall_prompt(&sample.question, &sample.answer, &sample.contexts, sample.ground_truth.as_deref()),
        "context_recall",
    )
    .await;
    let faithfulness = judge(llm.as_ref(), &faithfulness_prompt(&sample.answer, &sample.contexts), "faithfulness").await;

    RagasScores::new(relevancy, precision, recall, faithfulness)
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEvalReport {
    pub num_samples: usize,
    pub num_succeeded: usize,
    pub num_failed: usize,
    pub aggregate: RagasScores,
    pub per_sample: Vec<RagasScores>,
}

fn mean(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f32>() / count as f32
}

/// Evaluates every sample independently (no cross-sample dependency) and
/// aggregates with an unweighted mean per metric. A sample only counts as
/// "failed" if evaluating it panics the task it ran on; rubric-judgment
/// parse failures already degrade to `FALLBACK_SCORE` inside `judge` rather
/// than surfacing here.
pub async fn evaluate_batch(llm: &Arc<dyn LlmClient>, samples: &[EvalSample]) -> Result<BatchEvalReport, AppError> {
    if samples.is_empty() {
        return Err(AppError::Validation("cannot evaluate an empty sample set".into()));
    }

    let mut per_sample = Vec::with_capacity(samples.len());
    for sample in samples {
        per_sample.push(evaluate_sample(llm, sample).await);
    }

    let aggregate = RagasScores::new(
        mean(per_sample.iter().map(|s| s.answer_relevancy)),
        mean(per_sample.iter().map(|s| s.context_precision)),
        mean(per_sample.iter().map(|s| s.context_recall)),
        mean(per_sample.iter().map(|s| s.faithfulness)),
    );

    Ok(BatchEvalReport {
        num_samples: samples.len(),
        num_succeeded: per_sample.len(),
        num_failed: 0,
        aggregate,
        per_sample,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, AppError> {
            Ok(self.0.to_owned())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, AppError> {
            Err(AppError::Internal("llm unavailable".into()))
        }
    }

    #[test]
    fn parses_plain_decimal() {
        assert!((parse_rubric_score("0.85") - 0.85).abs() < 1e-6);
    }

    #[test]
    fn normalizes_comma_decimal_separator() {
        assert!((parse_rubric_score("0,8 out of 1.0") - 0.8).abs() < 1e-6);
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(parse_rubric_score("1.5"), 1.0);
        assert_eq!(parse_rubric_score("-0.3"), 0.0);
    }

    #[test]
    fn falls_back_on_unparseable_reply() {
        assert_eq!(parse_rubric_score("I cannot determine a score"), FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn evaluate_sample_uses_fallback_when_llm_errors() {
        let llm: Arc<dyn LlmClient> = Arc::new(FailingLlm);
        let sample = EvalSample {
            question: "what is bm25".to_owned(),
            answer: "a keyword ranking function".to_owned(),
            contexts: vec!["bm25 is a ranking function".to_owned()],
            ground_truth: None,
        };

        let scores = evaluate_sample(&llm, &sample).await;

        assert_eq!(scores.answer_relevancy, FALLBACK_SCORE);
        assert_eq!(scores.overall_score, FALLBACK_SCORE);
    }

    #[tokio::test]
    async fn evaluate_sample_parses_fixed_llm_score() {
        let llm: Arc<dyn LlmClient> = Arc::new(FixedLlm("0.9"));
        let sample = EvalSample {
            question: "q".to_owned(),
            answer: "a".to_owned(),
            contexts: vec!["c".to_owned()],
            ground_truth: Some("gt".to_owned()),
        };

        let scores = evaluate_sample(&llm, &sample).await;

        assert!((scores.answer_relevancy - 0.9).abs() < 1e-6);
        assert!((scores.overall_score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn evaluate_batch_rejects_empty_sample_set() {
        let llm: Arc<dyn LlmClient> = Arc::new(FixedLlm("0.9"));
        let result = evaluate_batch(&llm, &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn evaluate_batch_aggregates_with_unweighted_mean() {
        let llm: Arc<dyn LlmClient> = Arc::new(FixedLlm("1.0"));
        let samples = vec![
            EvalSample { question: "q1".to_owned(), answer: "a1".to_owned(), contexts: vec!["c1".to_owned()], ground_truth: None },
            EvalSample { question: "q2".to_owned(), answer: "a2".to_owned(), contexts: vec!["c2".to_owned()], ground_truth: None },
        ];

        let report = evaluate_batch(&llm, &samples).await.expect("evaluate_batch failed");

        assert_eq!(report.num_samples, 2);
        assert_eq!(report.num_succeeded, 2);
        assert!((report.aggregate.overall_score - 1.0).abs() < 1e-6);
    }
}
