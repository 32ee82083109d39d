use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted conversation turn (user or bot). Append-only; never mutated
/// after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    /// Phone-number-derived identity ("+91...").
    pub user_id: String,
    pub text: Option<String>,
    /// Provider-hosted media URL (crop photos), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    pub is_bot: bool,
    /// Free-form label: crop type, "voice_call_summary", "progress_update", ...
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// The turn's text, or "" for media-only turns.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn tag_or_empty(&self) -> &str {
        self.tag.as_deref().unwrap_or("")
    }
}
