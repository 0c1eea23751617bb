use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::errors::EngineError;

use super::store::{ChatTurn, Session, SessionStore};

struct StoredSession {
    session: Session,
    expires_at: Instant,
}

impl StoredSession {
    fn new(session_id: &str, expires_at: Instant) -> Self {
        Self {
            session: Session::new(session_id),
            expires_at,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory session store with an idle TTL.
///
/// Writes push the expiry deadline out by the full TTL; reads leave it
/// untouched. Expired sessions linger in the map until a write replaces
/// them or `purge_expired` sweeps them, but every accessor treats them
/// as absent.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Remove expired sessions, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, stored| stored.is_live(now));
        before - sessions.len()
    }

    /// Number of sessions currently held, expired ones included.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn live_entry<'a>(
        &self,
        sessions: &'a mut HashMap<String, StoredSession>,
        session_id: &str,
        now: Instant,
    ) -> &'a mut StoredSession {
        match sessions.entry(session_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_live(now) {
                    occupied.insert(StoredSession::new(session_id, now + self.ttl));
                }
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(StoredSession::new(session_id, now + self.ttl)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn fetch_or_create(&self, session_id: &str) -> Result<Session, EngineError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        Ok(self.live_entry(&mut sessions, session_id, now).session.clone())
    }

    async fn append_turn(
        &self,
        session_id: &str,
        query: &str,
        reply: &str,
    ) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let stored = self.live_entry(&mut sessions, session_id, now);

        stored.session.turns.push(ChatTurn {
            timestamp: chrono::Utc::now().to_rfc3339(),
            query: query.to_string(),
            reply: reply.to_string(),
        });
        stored.session.updated_at = chrono::Utc::now().to_rfc3339();
        stored.expires_at = now + self.ttl;

        Ok(())
    }

    async fn history(&self, session_id: &str) -> Result<Vec<ChatTurn>, EngineError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|stored| stored.is_live(Instant::now()))
            .map(|stored| stored.session.turns.clone())
            .unwrap_or_default())
    }

    async fn recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, EngineError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|stored| stored.is_live(Instant::now()))
            .map(|stored| {
                let turns = &stored.session.turns;
                turns[turns.len().saturating_sub(limit)..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn set_metadata(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let stored = self.live_entry(&mut sessions, session_id, now);

        stored.session.metadata.insert(key.to_string(), value);
        stored.session.updated_at = chrono::Utc::now().to_rfc3339();
        stored.expires_at = now + self.ttl;

        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        Ok(sessions
            .remove(session_id)
            .map(|stored| stored.is_live(now))
            .unwrap_or(false))
    }
}
