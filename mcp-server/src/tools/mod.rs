pub mod evaluate_rag;
pub mod research_deep;
pub mod strategy_compare;

use common::model::Document;
use tracing::warn;

use crate::state::McpState;

const ANSWER_CONTEXT_PREVIEW_CHARS: usize = 500;
const ANSWER_MAX_CONTEXTS: usize = 3;

fn synthesis_prompt(question: &str, contexts: &[String]) -> String {
    let context_block = contexts
        .iter()
        .take(ANSWER_MAX_CONTEXTS)
        .enumerate()
        .map(|(i, c)| {
            let preview: String = c.chars().take(ANSWER_CONTEXT_PREVIEW_CHARS).collect();
            format!("Document {}: {preview}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer this question based on the retrieved documents:\n\n\
         Question: {question}\n\nRetrieved Documents:\n{context_block}\n\n\
         Provide a clear, concise answer based only on the information in the documents."
    )
}

/// Synthesizes an answer from retrieved documents via a single LLM call.
/// Falls back to a fixed notice on LLM failure rather than failing the
/// whole tool call — an unreachable LLM should degrade the answer quality,
/// not the retrieval result the caller still gets.
pub async fn synthesize_answer(state: &McpState, question: &str, documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No relevant information found.".to_owned();
    }

    let contexts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
    match state.deps.llm.complete(&synthesis_prompt(question, &contexts), 0.1).await {
        Ok(answer) => answer,
        Err(err) => {
            warn!(error = %err, "answer synthesis failed");
            "Error generating answer from retrieved documents.".to_owned()
        }
    }
}
