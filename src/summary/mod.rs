//! Post-call treatment summaries.
//!
//! After a voice call ends the dialer posts the transcript back; this module
//! turns it into a WhatsApp treatment plan. A transcript with no farmer turns
//! produces nothing at all.

use std::sync::Arc;

use serde_json::Value;

use crate::ai::{AiClient, Message};
use crate::dispatch::OutboundDispatcher;
use crate::models::{CallTranscript, TranscriptEntry};

pub const SUMMARY_TAG: &str = "voice_call_summary";
pub const COMPLETE_TAG: &str = "voice_call_complete";

const MAX_TOKENS: u32 = 800;
const TEMPERATURE: f32 = 0.4;

/// Parse the dialer's `call_conversation` field. Providers send either a JSON
/// array or that same array serialized as a string; both forms are accepted.
/// Turns with unknown roles or noise-only content are dropped.
pub fn parse_conversation(raw: &Value) -> Vec<TranscriptEntry> {
    let entries: Vec<TranscriptEntry> = match raw {
        Value::Array(_) => serde_json::from_value(raw.clone()).unwrap_or_default(),
        Value::String(s) => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter(|e| e.is_user() || e.is_assistant())
        .filter(|e| {
            let content = e.content.trim();
            !content.is_empty()
                && !content.eq_ignore_ascii_case("noise")
                && !content.eq_ignore_ascii_case("<noise>")
        })
        .collect()
}

fn render_transcript(entries: &[TranscriptEntry]) -> String {
    let mut rendered = String::new();
    for entry in entries {
        let speaker = if entry.is_user() { "Farmer" } else { "Expert" };
        rendered.push_str(&format!("{}: {}\n", speaker, entry.content.trim()));
    }
    rendered
}

fn summary_prompt(transcript: &str, duration_secs: u64) -> Vec<Message> {
    vec![
        Message::system(
            "You are KHETI AI EXPERT writing a WhatsApp follow-up after a voice call \
             with an Indian farmer. Write in Hindi with key terms in English. \
             Structure: 1) समस्या (the problem discussed), 2) इलाज (treatment with \
             product names and dosage), 3) अगले कदम (next steps with timing). \
             Be specific and practical. Keep it under 400 words.",
        ),
        Message::user(format!(
            "Call duration: {} seconds.\nTranscript:\n{}",
            duration_secs, transcript
        )),
    ]
}

fn fallback_message(duration_secs: u64) -> String {
    format!(
        "✅ आपकी कॉल पूरी हुई! (Your call is complete - {} seconds)\n\n\
         🌾 कॉल में बताई गई सलाह का पालन करें। (Follow the advice from the call.)\n\n\
         💬 और सवाल हों तो यहां लिखें या अपनी फसल की फोटो भेजें। \
         (For more questions, message here or send a crop photo.)",
        duration_secs
    )
}

pub struct PostCallSummarizer {
    ai: Arc<AiClient>,
    outbound: Arc<OutboundDispatcher>,
}

impl PostCallSummarizer {
    pub fn new(ai: Arc<AiClient>, outbound: Arc<OutboundDispatcher>) -> Self {
        Self { ai, outbound }
    }

    /// Summarize one finished call and deliver the result over WhatsApp.
    /// Returns false only when the transcript has no farmer turns, in which
    /// case nothing is sent.
    pub async fn summarize(
        &self,
        user_id: &str,
        phone_number: &str,
        transcript: &CallTranscript,
    ) -> bool {
        let entries = parse_conversation(&transcript.call_conversation);
        if !entries.iter().any(|e| e.is_user()) {
            log::info!(
                "Transcript for {} has no farmer turns, skipping summary",
                user_id
            );
            return false;
        }

        let rendered = render_transcript(&entries);
        let duration = transcript.duration_seconds();

        let (text, tag) = match self
            .ai
            .complete(summary_prompt(&rendered, duration), MAX_TOKENS, TEMPERATURE)
            .await
        {
            Ok(summary) => (summary, SUMMARY_TAG),
            Err(e) => {
                log::error!("Summary generation failed for {}: {}", user_id, e.message);
                (fallback_message(duration), COMPLETE_TAG)
            }
        };

        self.outbound
            .deliver(user_id, phone_number, &text, Some(tag))
            .await;
        true
    }
}
