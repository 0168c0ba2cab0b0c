use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::debug;

use super::{Embedder, LlmClient};
use crate::error::AppError;

/// `LlmClient`/`Embedder` backed by the OpenAI chat-completions and
/// embeddings APIs, in the same call shape the teacher's
/// `utils::embedding::generate_embedding` and `answer_retrieval` modules
/// already use.
pub struct OpenAiAdapter {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: &str, base_url: &str, chat_model: String, embedding_model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
        Self {
            client: Client::with_config(config),
            chat_model,
            embedding_model,
        }
    }

    /// An adapter that is never actually called: wires up `Dependencies` in
    /// tests that exercise strategies/pipeline plumbing unrelated to the LLM
    /// or embeddings.
    pub fn stub() -> Self {
        Self::new("test-key", "http://127.0.0.1:0/v1", "gpt-4o-mini".to_owned(), "text-embedding-3-small".to_owned())
    }
}

#[async_trait]
impl LlmClient for OpenAiAdapter {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .temperature(temperature)
            .messages([
                ChatCompletionRequestSystemMessage::from(
                    "You are a precise retrieval assistant. Follow the requested output format exactly.",
                )
                .into(),
                ChatCompletionRequestUserMessage::from(prompt).into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::EvalParse("no content in LLM response".into()))
    }
}

#[async_trait]
impl Embedder for OpenAiAdapter {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let vectors = self.embed_documents(std::slice::from_ref(&text.to_owned())).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("embedding response was empty".into()))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(texts.to_vec())
            .build()?;

        let response = self.client.embeddings().create(request).await?;
        debug!(count = response.data.len(), "generated embeddings");
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
