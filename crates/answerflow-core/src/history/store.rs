//! Session History Store - Ordered per-session turn logs
//!
//! Holds every session's conversation as an ordered sequence of turns.
//! An unknown session id is a valid empty-history query, never a fault,
//! and sessions are created lazily on first append.
//!
//! The store itself is not serialized per session: two in-flight requests
//! appending to the same session id interleave in an unspecified order.
//! Callers that accept concurrent requests for one session must serialize
//! access themselves.

use answerflow_traits::Turn;
use dashmap::DashMap;

/// In-memory per-session turn log. Lives for the process lifetime; no
/// eviction.
#[derive(Debug, Default)]
pub struct SessionHistoryStore {
    sessions: DashMap<String, Vec<Turn>>,
}

impl SessionHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns for a session, oldest first. Empty for unknown ids.
    pub fn get(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .get(session_id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    /// Append turns to a session, creating it if absent.
    pub fn append(&self, session_id: &str, turns: impl IntoIterator<Item = Turn>) {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .extend(turns);
    }

    /// Replace a session's history wholesale.
    ///
    /// Used only for the compaction write-back, which swaps a prefix of the
    /// log for one synthetic summary turn.
    pub fn replace(&self, session_id: &str, history: Vec<Turn>) {
        self.sessions.insert(session_id.to_string(), history);
    }

    /// Number of turns currently recorded for a session.
    pub fn len(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map(|turns| turns.len())
            .unwrap_or(0)
    }

    /// Whether a session has no recorded turns.
    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }
}
