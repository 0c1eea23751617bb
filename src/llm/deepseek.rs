use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{ChatMessage, ChatRequest};
use crate::config::Settings;
use crate::errors::ProviderError;

/// Client for the DeepSeek chat-completions and embeddings API.
///
/// Any OpenAI-compatible endpoint works through `base_url`, which is how the
/// HTTP tests point it at a local mock server.
#[derive(Clone)]
pub struct DeepSeekProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    chat_timeout: Duration,
    eval_timeout: Duration,
    stream_timeout: Duration,
    embed_timeout: Duration,
    client: Client,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

impl ResponseFormat {
    fn json_object() -> Self {
        Self {
            format_type: "json_object",
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl DeepSeekProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            chat_timeout: Duration::from_secs(settings.chat_timeout_secs),
            eval_timeout: Duration::from_secs(settings.eval_timeout_secs),
            stream_timeout: Duration::from_secs(settings.stream_timeout_secs),
            embed_timeout: Duration::from_secs(settings.embed_timeout_secs),
            client: Client::new(),
        }
    }

    async fn complete(
        &self,
        request: ChatRequest,
        response_format: Option<ResponseFormat>,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.chat_model,
            messages: &request.messages,
            stream: false,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            frequency_penalty: request.frequency_penalty,
            stop: request.stop.as_deref(),
            response_format,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;
        let res = check_status(res).await?;

        let payload: ChatCompletionResponse = res.json().await.map_err(ProviderError::malformed)?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(choice.message.content.trim().to_string())
    }
}

#[async_trait]
impl LlmProvider for DeepSeekProvider {
    fn name(&self) -> &str {
        "deepseek"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        self.complete(request, None, self.chat_timeout).await
    }

    async fn chat_json(&self, request: ChatRequest) -> Result<String, ProviderError> {
        self.complete(request, Some(ResponseFormat::json_object()), self.eval_timeout)
            .await
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.chat_model,
            messages: &request.messages,
            stream: true,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            frequency_penalty: request.frequency_penalty,
            stop: request.stop.as_deref(),
            response_format: None,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.stream_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;
        let res = check_status(res).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in chunk_str.lines() {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }

                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            // Undecodable chunks are skipped, not fatal.
                            let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
                                continue;
                            };
                            let content = chunk
                                .choices
                                .first()
                                .and_then(|choice| choice.delta.content.as_deref())
                                .unwrap_or_default();
                            if !content.is_empty()
                                && tx.send(Ok(content.to_string())).await.is_err()
                            {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ProviderError::from_reqwest(err))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingsRequest {
            model: &self.embedding_model,
            input: inputs,
            encoding_format: "float",
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.embed_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;
        let res = check_status(res).await?;

        let payload: EmbeddingsResponse = res.json().await.map_err(ProviderError::malformed)?;
        let vectors: Vec<Vec<f32>> = payload.data.into_iter().map(|row| row.embedding).collect();

        // A partial answer is as unusable as none: the engine needs one
        // vector per input to keep segments and embeddings aligned.
        if vectors.len() != inputs.len() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(vectors)
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|payload| payload.error.message)
        .unwrap_or(body);

    Err(ProviderError::Status {
        code: status.as_u16(),
        message,
    })
}
