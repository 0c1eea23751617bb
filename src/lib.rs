//! Retrieval-augmented customer-service chat engine.
//!
//! The crate embeds a text corpus, answers "most relevant snippets"
//! queries by cosine similarity, and orchestrates chat turns against a
//! DeepSeek-compatible provider: retrieval, generation, reply
//! evaluation, and per-session history with an idle TTL. An HTTP layer
//! is expected to sit on top; nothing here owns a transport.
//!
//! # Components
//!
//! - `knowledge`: segmenter, cosine ranking, and the in-memory store
//! - `llm`: provider trait, DeepSeek client, and the offline mock
//! - `sessions`: session store trait and in-memory TTL implementation
//! - `service`: the chat orchestration facade
//! - `config` / `errors` / `logging`: settings, error types, tracing setup

pub mod config;
pub mod errors;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod service;
pub mod sessions;


pub use config::Settings;
pub use errors::{EngineError, ProviderError};
pub use knowledge::KnowledgeBase;
pub use llm::{DeepSeekProvider, LlmProvider, MockProvider};
pub use service::{ChatOutcome, ChatService, ReplyEvaluation};
pub use sessions::{MemorySessionStore, SessionStore};
