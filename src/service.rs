//! Chat orchestration: session lookup, retrieval, generation, evaluation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::errors::{EngineError, ProviderError};
use crate::knowledge::KnowledgeBase;
use crate::llm::deepseek::DeepSeekProvider;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest};
use crate::sessions::store::{ChatTurn, SessionStore};
use crate::sessions::MemorySessionStore;

/// Reply shown when the provider request timed out.
pub const TIMEOUT_FALLBACK_REPLY: &str = "请求超时，请稍后再试。";
/// Reply shown when the provider answered with a non-success status.
pub const UNAVAILABLE_FALLBACK_REPLY: &str = "抱歉，我暂时无法回答这个问题，请稍后再试。";
/// Reply shown for any other provider failure.
pub const BUSY_FALLBACK_REPLY: &str = "系统繁忙，请稍后再试。";

const NEUTRAL_EVALUATION_NOTE: &str = "评估服务异常";
const EVALUATION_FAILED_NOTE: &str = "评估失败";

/// Quality assessment of a generated reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEvaluation {
    pub score: i64,
    pub improvement: String,
}

impl ReplyEvaluation {
    fn neutral(improvement: &str) -> Self {
        Self {
            score: 3,
            improvement: improvement.to_string(),
        }
    }
}

/// Result of one completed chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub reply: String,
    pub context_used: String,
    pub evaluation: ReplyEvaluation,
}

/// The owned state object behind the chat surface.
///
/// Holds the provider, the knowledge base, and the session store; every
/// request handler works through a shared handle to one instance.
pub struct ChatService {
    provider: Arc<dyn LlmProvider>,
    knowledge: Arc<KnowledgeBase>,
    sessions: Arc<dyn SessionStore>,
    settings: Settings,
}

impl ChatService {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        knowledge: Arc<KnowledgeBase>,
        sessions: Arc<dyn SessionStore>,
        settings: Settings,
    ) -> Self {
        tracing::info!("Chat service ready with provider '{}'", provider.name());
        Self {
            provider,
            knowledge,
            sessions,
            settings,
        }
    }

    /// Production wiring: DeepSeek provider, in-memory sessions, and a
    /// knowledge base loaded from the configured directory.
    pub async fn initialize(settings: Settings) -> Self {
        let provider: Arc<dyn LlmProvider> = Arc::new(DeepSeekProvider::new(&settings));
        let knowledge = Arc::new(KnowledgeBase::new(provider.clone(), &settings));
        knowledge.load_from_dir(&settings.knowledge_dir).await;

        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(
            Duration::from_secs(settings.session_ttl_secs),
        ));

        Self::new(provider, knowledge, sessions, settings)
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Answer `query` within the given session.
    ///
    /// Retrieval and generation failures degrade to canned replies; the
    /// turn is always recorded. Only session-store failures surface.
    pub async fn respond(&self, session_id: &str, query: &str) -> Result<ChatOutcome, EngineError> {
        let started = std::time::Instant::now();
        self.sessions.fetch_or_create(session_id).await?;

        let context = self
            .knowledge
            .retrieve_context(query, self.settings.retrieve_top_k)
            .await;
        if context.is_empty() {
            tracing::debug!("No knowledge context for query");
        } else {
            tracing::debug!(
                "Retrieved context: {}",
                context.chars().take(100).collect::<String>()
            );
        }

        let history = self
            .sessions
            .recent_turns(session_id, self.settings.history_window)
            .await?;
        let request = self.chat_request(&history, &context, query);

        let reply = match self.provider.chat(request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("Chat completion failed: {}", err);
                fallback_reply(&err).to_string()
            }
        };

        let evaluation = self.evaluate_reply(query, &reply).await;

        self.sessions.append_turn(session_id, query, &reply).await?;
        tracing::info!("Chat request handled in {:.2?}", started.elapsed());

        Ok(ChatOutcome {
            reply,
            context_used: context_preview(&context),
            evaluation,
        })
    }

    /// Streamed variant of [`respond`](Self::respond).
    ///
    /// Yields reply chunks as they arrive; once the stream ends the
    /// collected reply is recorded in the session. Streamed replies are
    /// not evaluated. A provider failure before the first chunk surfaces
    /// as an error for the caller to render.
    pub async fn respond_streaming(
        &self,
        session_id: &str,
        query: &str,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, EngineError> {
        self.sessions.fetch_or_create(session_id).await?;

        let context = self
            .knowledge
            .retrieve_context(query, self.settings.retrieve_top_k)
            .await;
        let history = self
            .sessions
            .recent_turns(session_id, self.settings.history_window)
            .await?;

        let mut request = self.chat_request(&history, &context, query);
        // Streaming requests carry only temperature and max_tokens.
        request.top_p = None;
        request.frequency_penalty = None;

        let mut upstream = self.provider.stream_chat(request).await?;

        let (tx, rx) = mpsc::channel(32);
        let sessions = self.sessions.clone();
        let session_id = session_id.to_string();
        let query = query.to_string();

        tokio::spawn(async move {
            let mut collected = String::new();
            while let Some(chunk) = upstream.recv().await {
                match chunk {
                    Ok(content) => {
                        collected.push_str(&content);
                        // Keep draining even if the caller went away, so
                        // the turn still lands in the session history.
                        let _ = tx.send(Ok(content)).await;
                    }
                    Err(err) => {
                        tracing::warn!("Reply stream aborted: {}", err);
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }

            if !collected.is_empty() {
                if let Err(err) = sessions.append_turn(&session_id, &query, &collected).await {
                    tracing::warn!("Failed to record streamed turn: {}", err);
                }
            }
        });

        Ok(rx)
    }

    /// Summarize the session's history and store it under the `summary`
    /// metadata key. An empty history yields an empty summary without a
    /// provider call.
    pub async fn summarize_session(&self, session_id: &str) -> Result<String, EngineError> {
        let turns = self.sessions.history(session_id).await?;
        if turns.is_empty() {
            return Ok(String::new());
        }

        let mut prompt = String::from("请为以下客服对话生成摘要，突出关键问题和解决方案：\n\n");
        for (index, turn) in turns.iter().enumerate() {
            prompt.push_str(&format!("用户{}: {}\n", index + 1, turn.query));
            prompt.push_str(&format!("客服{}: {}\n\n", index + 1, turn.reply));
        }

        let mut request = ChatRequest::new(vec![ChatMessage {
            role: "user".to_string(),
            content: prompt,
        }]);
        request.temperature = Some(0.3);
        request.max_tokens = Some(256);

        let summary = self.provider.chat(request).await?;
        self.sessions
            .set_metadata(
                session_id,
                "summary",
                serde_json::Value::String(summary.clone()),
            )
            .await?;

        Ok(summary)
    }

    fn chat_request(&self, history: &[ChatTurn], context: &str, query: &str) -> ChatRequest {
        let mut system_prompt = self.settings.system_prompt.clone();
        if !context.is_empty() {
            system_prompt.push_str("\n\n[相关知识]\n");
            system_prompt.push_str(context);
        }

        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system_prompt,
        });
        for turn in history {
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: turn.query.clone(),
            });
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: turn.reply.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: query.to_string(),
        });

        let mut request = ChatRequest::new(messages);
        request.temperature = Some(0.7);
        request.max_tokens = Some(512);
        request.top_p = Some(0.9);
        request.frequency_penalty = Some(0.2);
        request
    }

    async fn evaluate_reply(&self, query: &str, reply: &str) -> ReplyEvaluation {
        let prompt = format!(
            "请评估以下客服回复的质量（1-5分），并给出改进建议：\n\
             问题：{query}\n\
             回复：{reply}\n\n\
             评估维度：\n\
             1. 信息准确性\n\
             2. 语言专业性\n\
             3. 问题解决程度\n\n\
             请用JSON格式返回：\n\
             {{\"score\": 分数, \"improvement\": \"改进建议\"}}"
        );

        let mut request = ChatRequest::new(vec![ChatMessage {
            role: "user".to_string(),
            content: prompt,
        }]);
        request.temperature = Some(0.3);
        request.max_tokens = Some(256);

        match self.provider.chat_json(request).await {
            Ok(raw) => parse_evaluation(&raw),
            Err(err @ ProviderError::Status { .. }) => {
                tracing::warn!("Reply evaluation failed: {}", err);
                ReplyEvaluation::neutral(EVALUATION_FAILED_NOTE)
            }
            Err(err) => {
                tracing::warn!("Reply evaluation failed: {}", err);
                ReplyEvaluation::neutral(NEUTRAL_EVALUATION_NOTE)
            }
        }
    }
}

fn fallback_reply(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Timeout(_) => TIMEOUT_FALLBACK_REPLY,
        ProviderError::Status { .. } => UNAVAILABLE_FALLBACK_REPLY,
        _ => BUSY_FALLBACK_REPLY,
    }
}

/// A response that is not the expected JSON shape degrades to the neutral
/// evaluation rather than failing the chat turn.
fn parse_evaluation(raw: &str) -> ReplyEvaluation {
    serde_json::from_str(raw)
        .unwrap_or_else(|_| ReplyEvaluation::neutral(NEUTRAL_EVALUATION_NOTE))
}

fn context_preview(context: &str) -> String {
    if context.is_empty() {
        return String::new();
    }
    let preview: String = context.chars().take(100).collect();
    format!("{preview}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_reply_distinguishes_failure_modes() {
        assert_eq!(
            fallback_reply(&ProviderError::Timeout("15s".to_string())),
            TIMEOUT_FALLBACK_REPLY
        );
        assert_eq!(
            fallback_reply(&ProviderError::Status {
                code: 500,
                message: "boom".to_string()
            }),
            UNAVAILABLE_FALLBACK_REPLY
        );
        assert_eq!(
            fallback_reply(&ProviderError::Unreachable("refused".to_string())),
            BUSY_FALLBACK_REPLY
        );
        assert_eq!(fallback_reply(&ProviderError::EmptyResponse), BUSY_FALLBACK_REPLY);
    }

    #[test]
    fn evaluation_parses_well_formed_json() {
        let parsed = parse_evaluation(r#"{"score": 4, "improvement": "可以更简洁"}"#);
        assert_eq!(parsed.score, 4);
        assert_eq!(parsed.improvement, "可以更简洁");
    }

    #[test]
    fn evaluation_degrades_on_missing_fields_or_bad_json() {
        let missing = parse_evaluation(r#"{"score": 4}"#);
        assert_eq!(missing.score, 3);
        assert_eq!(missing.improvement, "评估服务异常");

        let garbage = parse_evaluation("not json at all");
        assert_eq!(garbage.score, 3);
        assert_eq!(garbage.improvement, "评估服务异常");
    }

    #[test]
    fn context_preview_truncates_to_100_chars() {
        assert_eq!(context_preview(""), "");

        let short = context_preview("退货政策。");
        assert_eq!(short, "退货政策。...");

        let long_context = "知".repeat(150);
        let preview = context_preview(&long_context);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }
}
