use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::errors::ProviderError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "deepseek")
    fn name(&self) -> &str;

    /// chat completion (non-streaming); returns the first choice's content
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;

    /// chat completion constrained to a JSON object response
    async fn chat_json(&self, request: ChatRequest) -> Result<String, ProviderError>;

    /// chat completion (streaming)
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError>;

    /// generate embeddings, one vector per input and in input order
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}
