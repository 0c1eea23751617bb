use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EngineError;

/// One completed question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub timestamp: String,
    pub query: String,
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub turns: Vec<ChatTurn>,
    pub metadata: HashMap<String, Value>,
}

impl Session {
    pub fn new(id: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.to_string(),
            created_at: now.clone(),
            updated_at: now,
            turns: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Conversation state keyed by session id.
///
/// Sessions past their idle deadline are treated as if they never
/// existed: fetches recreate them and reads return nothing.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the live session, creating a fresh one if absent or expired.
    async fn fetch_or_create(&self, session_id: &str) -> Result<Session, EngineError>;

    /// Record a completed turn, creating the session if needed.
    async fn append_turn(&self, session_id: &str, query: &str, reply: &str)
        -> Result<(), EngineError>;

    /// Full turn history, oldest first. Empty for unknown sessions.
    async fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>, EngineError>;

    /// The most recent `limit` turns, oldest first.
    async fn recent_turns(&self, session_id: &str, limit: usize)
        -> Result<Vec<ChatTurn>, EngineError>;

    /// Attach a metadata value, creating the session if needed.
    async fn set_metadata(&self, session_id: &str, key: &str, value: Value)
        -> Result<(), EngineError>;

    /// Drop the session. Returns whether a live session was removed.
    async fn end_session(&self, session_id: &str) -> Result<bool, EngineError>;
}
