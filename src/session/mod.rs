//! Per-user session state: a sliding-TTL, FIFO-bounded window over the most
//! recent conversation turns. The append-only message store stays the source
//! of truth; sessions are projections that can always be rebuilt from it.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::db::Database;
use crate::models::{ConversationTurn, SessionInfo};

struct SessionState {
    message_count: usize,
    window: VecDeque<ConversationTurn>,
    expires_at: DateTime<Utc>,
}

pub struct SessionManager {
    db: Arc<Database>,
    sessions: DashMap<String, SessionState>,
    ttl: Duration,
    window_cap: usize,
}

impl SessionManager {
    pub fn new(db: Arc<Database>, ttl_minutes: i64, window_cap: usize) -> Self {
        Self {
            db,
            sessions: DashMap::new(),
            ttl: Duration::minutes(ttl_minutes),
            window_cap,
        }
    }

    /// Expiry is lazy: checked on access, no background sweep.
    fn purge_if_expired(&self, user_id: &str) {
        let expired = self
            .sessions
            .get(user_id)
            .map(|s| s.expires_at <= Utc::now())
            .unwrap_or(false);
        if expired {
            self.sessions.remove(user_id);
            log::debug!("Session expired for {}", user_id);
        }
    }

    /// Seed a new session window from the message store, oldest first.
    /// Store failure degrades to an empty window rather than failing the
    /// request.
    fn seed_window(&self, user_id: &str) -> VecDeque<ConversationTurn> {
        match self.db.get_recent(user_id, self.window_cap) {
            Ok(mut turns) => {
                turns.reverse();
                turns.into()
            }
            Err(e) => {
                log::warn!("Session seed failed for {}: {} (starting empty)", user_id, e);
                VecDeque::new()
            }
        }
    }

    /// Create-or-refresh the session for a user and return its metadata.
    pub fn touch(&self, user_id: &str) -> SessionInfo {
        self.purge_if_expired(user_id);
        let expires_at = Utc::now() + self.ttl;

        let mut entry = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                let window = self.seed_window(user_id);
                SessionState {
                    message_count: window.len(),
                    window,
                    expires_at,
                }
            });
        entry.expires_at = expires_at;

        SessionInfo {
            user_id: user_id.to_string(),
            message_count: entry.message_count,
            time_remaining_secs: (entry.expires_at - Utc::now()).num_seconds(),
            expires_at: entry.expires_at,
        }
    }

    /// Feed a persisted turn into the live window. Creates the session if
    /// needed; evicts oldest-first once the cap is exceeded.
    pub fn record_turn(&self, user_id: &str, turn: ConversationTurn) {
        self.touch(user_id);
        if let Some(mut entry) = self.sessions.get_mut(user_id) {
            // A freshly seeded window may already hold this turn.
            if entry.window.back().map_or(false, |last| last.id == turn.id) {
                return;
            }
            entry.window.push_back(turn);
            while entry.window.len() > self.window_cap {
                entry.window.pop_front();
            }
            entry.message_count += 1;
        }
    }

    /// The most recent turns, oldest first, truncated to `max_turns`.
    /// Falls back to the message store when no live session exists; a store
    /// failure yields an empty window (stateless single-turn behavior).
    pub fn get_context_window(&self, user_id: &str, max_turns: usize) -> Vec<ConversationTurn> {
        self.purge_if_expired(user_id);

        if let Some(entry) = self.sessions.get(user_id) {
            let skip = entry.window.len().saturating_sub(max_turns);
            return entry.window.iter().skip(skip).cloned().collect();
        }

        match self.db.get_recent(user_id, max_turns) {
            Ok(mut turns) => {
                turns.reverse();
                turns
            }
            Err(e) => {
                log::warn!("Context window fetch failed for {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    /// Session metadata without creating one.
    pub fn session_info(&self, user_id: &str) -> Option<SessionInfo> {
        self.purge_if_expired(user_id);
        self.sessions.get(user_id).map(|entry| SessionInfo {
            user_id: user_id.to_string(),
            message_count: entry.message_count,
            time_remaining_secs: (entry.expires_at - Utc::now()).num_seconds(),
            expires_at: entry.expires_at,
        })
    }

    /// Delete session state; returns whether one existed.
    pub fn clear(&self, user_id: &str) -> bool {
        self.sessions.remove(user_id).is_some()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(ttl_minutes: i64, cap: usize) -> SessionManager {
        let db = Arc::new(Database::new(":memory:").unwrap());
        SessionManager::new(db, ttl_minutes, cap)
    }

    fn turn(db: &Database, user: &str, text: &str) -> ConversationTurn {
        db.save_turn(user, Some(text), None, false, None).unwrap()
    }

    #[test]
    fn window_evicts_fifo_at_cap() {
        let mgr = manager(30, 6);
        let db = mgr.db.clone();
        for i in 0..11 {
            let t = turn(&db, "+911", &format!("m{}", i));
            mgr.record_turn("+911", t);
        }

        let window = mgr.get_context_window("+911", 20);
        assert_eq!(window.len(), 6);
        let texts: Vec<_> = window.iter().map(|t| t.text_or_empty()).collect();
        assert_eq!(texts, vec!["m5", "m6", "m7", "m8", "m9", "m10"]);
    }

    #[test]
    fn context_window_truncates_to_most_recent() {
        let mgr = manager(30, 10);
        let db = mgr.db.clone();
        for i in 0..5 {
            let t = turn(&db, "+911", &format!("m{}", i));
            mgr.record_turn("+911", t);
        }

        let window = mgr.get_context_window("+911", 2);
        let texts: Vec<_> = window.iter().map(|t| t.text_or_empty()).collect();
        assert_eq!(texts, vec!["m3", "m4"]);
    }

    #[test]
    fn touch_seeds_window_from_store() {
        let mgr = manager(30, 10);
        let db = mgr.db.clone();
        turn(&db, "+911", "earlier message");

        let info = mgr.touch("+911");
        assert_eq!(info.message_count, 1);
        let window = mgr.get_context_window("+911", 10);
        assert_eq!(window[0].text_or_empty(), "earlier message");
    }

    #[test]
    fn zero_ttl_expires_lazily_on_access() {
        let mgr = manager(0, 10);
        mgr.touch("+911");
        assert!(mgr.session_info("+911").is_none());
    }

    #[test]
    fn clear_reports_existence() {
        let mgr = manager(30, 10);
        mgr.touch("+911");
        assert!(mgr.clear("+911"));
        assert!(!mgr.clear("+911"));
    }

    #[test]
    fn no_session_falls_back_to_store() {
        let mgr = manager(30, 10);
        let db = mgr.db.clone();
        turn(&db, "+911", "from the log");

        let window = mgr.get_context_window("+911", 10);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].text_or_empty(), "from the log");
    }
}
