use chrono::{DateTime, Utc};
use serde::Serialize;

/// Session metadata returned by the session manager and the sessions API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user_id: String,
    pub message_count: usize,
    /// Seconds until the sliding TTL expires the session.
    pub time_remaining_secs: i64,
    pub expires_at: DateTime<Utc>,
}
