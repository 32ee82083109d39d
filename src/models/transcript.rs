use serde::{Deserialize, Serialize};

/// One `{role, content}` entry from the voice provider's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
}

impl TranscriptEntry {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

/// Post-call payload from the dialer provider. `call_conversation` arrives
/// either as a JSON array or as a JSON-encoded string of the same array, so
/// it is kept as a raw value and parsed by the summarizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallTranscript {
    #[serde(default)]
    pub did_no: String,
    #[serde(default)]
    pub call_duration: String,
    #[serde(default)]
    pub recordid: String,
    #[serde(default)]
    pub call_conversation: serde_json::Value,
}

impl CallTranscript {
    pub fn duration_seconds(&self) -> u64 {
        self.call_duration.trim().parse().unwrap_or(0)
    }
}
