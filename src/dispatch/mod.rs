//! Inbound message routing.
//!
//! One inbound WhatsApp event maps to exactly one intent path: direct call
//! request, voice-bot confirmation, progress query, follow-up, or the general
//! chat/image path. Every path ends with at least one user-visible message,
//! including every failure path.

mod outbound;
#[cfg(test)]
mod pipeline_tests;

pub use outbound::{split_message, ChunkReceipt, OutboundDispatcher, MAX_CHUNK_CHARS};

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::ai::{AiClient, Message};
use crate::calls::CallOrchestrator;
use crate::channels::MessageTransport;
use crate::config::Config;
use crate::db::Database;
use crate::followup::{self, FollowUpResponder};
use crate::intent::{self, markers, IntentDecision};
use crate::models::{CallStatus, CallTrigger, TriggerReason};
use crate::session::SessionManager;

const CLASSIFY_LOOKBACK: usize = 10;
const PROGRESS_LOOKBACK: usize = 20;
const CHAT_MAX_TOKENS: u32 = 1000;
const CHAT_TEMPERATURE: f32 = 0.7;
const ANALYSIS_MAX_TOKENS: u32 = 1200;
const ANALYSIS_TEMPERATURE: f32 = 0.4;
/// Every Nth message in a session, remind the user a voice call is available.
const CALL_HINT_EVERY: usize = 7;
/// Past this many messages in one session, nudge towards a call or photo.
const LONG_SESSION_THRESHOLD: usize = 20;

pub fn voice_offer_message() -> String {
    format!(
        "{} {} से बात करें! (Talk to {}!)\n\n\
         आवाज़ में विस्तार से सलाह चाहिए? हमारा expert आपको कॉल करेगा।\n\
         (Want detailed advice by voice? Our expert will call you.)\n\n\
         ✅ हाँ के लिए 'yes' या 'हाँ' लिखें (Reply 'yes' to get a call)",
        markers::VOICE_OFFER_EMOJI,
        markers::VOICE_OFFER_NAME,
        markers::VOICE_OFFER_NAME,
    )
}

const HELP_MESSAGE: &str = "🌾 नमस्ते! मैं आपका खेती सहायक हूं। (Hello! I'm your farming assistant.)\n\n\
    आप कर सकते हैं (You can):\n\
    📷 फसल की फोटो भेजें (Send a crop photo for diagnosis)\n\
    💬 अपनी समस्या लिखें (Describe your problem in text)\n\
    📞 'call करें' लिखें आवाज़ में बात के लिए (Write 'call करें' for a voice call)";

const APOLOGY_MESSAGE: &str = "🙏 क्षमा करें, अभी जवाब देने में समस्या आ रही है। \
    (Sorry, I'm having trouble responding right now.)\n\n\
    कृपया कुछ देर बाद फिर से कोशिश करें या अपनी फसल की फोटो भेजें। \
    (Please try again shortly or send a crop photo.)";

const IMAGE_ACK_MESSAGE: &str = "📷 फोटो मिल गई! जांच हो रही है... \
    (Photo received! Analyzing...)\n⏳ कृपया 30 सेकंड प्रतीक्षा करें।";

const IMAGE_FAIL_MESSAGE: &str = "❌ फोटो की जांच नहीं हो पाई। (Could not analyze the photo.)\n\n\
    कृपया दोबारा कोशिश करें:\n\
    • साफ रोशनी में फोटो लें (Take the photo in good light)\n\
    • प्रभावित पत्ती या हिस्से के पास से लें (Get close to the affected part)\n\
    • या समस्या टेक्स्ट में लिखें (Or describe the problem in text)";

const CALL_HINT: &str = "\n\n🎙️ Tip: आवाज़ में विस्तार से बात के लिए 'call करें' लिखें।";

const LONG_SESSION_HINT: &str = "\n\n💡 लंबी बातचीत हो गई है! फोटो भेजें या \
    'call करें' लिखें ताकि जल्दी समाधान मिले।";

/// What the pipeline did with one inbound event, surfaced in API envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    CallInitiated,
    CallFailed,
    CallSkipped,
    ProgressReport,
    FollowUp,
    ImageAnalysis,
    GeneralReply,
    Help,
}

impl DispatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchAction::CallInitiated => "call_initiated",
            DispatchAction::CallFailed => "call_failed",
            DispatchAction::CallSkipped => "call_skipped",
            DispatchAction::ProgressReport => "progress_report",
            DispatchAction::FollowUp => "follow_up",
            DispatchAction::ImageAnalysis => "image_analysis",
            DispatchAction::GeneralReply => "general_reply",
            DispatchAction::Help => "help",
        }
    }
}

/// Strip a trailing `CROP_TYPE: <value>` line from an analysis response and
/// return the cleaned text plus the crop tag, lowercased.
fn extract_crop_tag(response: &str) -> (String, Option<String>) {
    let mut tag = None;
    let mut kept: Vec<&str> = Vec::new();
    for line in response.lines() {
        if let Some(value) = line.trim().strip_prefix("CROP_TYPE:") {
            let value = value.trim();
            if !value.is_empty() {
                tag = Some(value.to_lowercase());
            }
            continue;
        }
        kept.push(line);
    }
    (kept.join("\n").trim().to_string(), tag)
}

pub struct MessageDispatcher {
    db: Arc<Database>,
    sessions: Arc<SessionManager>,
    outbound: Arc<OutboundDispatcher>,
    transport: Arc<dyn MessageTransport>,
    ai: Arc<AiClient>,
    calls: Arc<CallOrchestrator>,
    followups: FollowUpResponder,
    context_window_turns: usize,
}

impl MessageDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        sessions: Arc<SessionManager>,
        outbound: Arc<OutboundDispatcher>,
        transport: Arc<dyn MessageTransport>,
        ai: Arc<AiClient>,
        calls: Arc<CallOrchestrator>,
        config: &Config,
    ) -> Self {
        let followups = FollowUpResponder::new(ai.clone());
        Self {
            db,
            sessions,
            outbound,
            transport,
            ai,
            calls,
            followups,
            context_window_turns: config.context_window_turns,
        }
    }

    /// Route one inbound WhatsApp event. `phone_number` has already had the
    /// transport prefix stripped; `user_id` is the bare phone number.
    pub async fn handle_inbound(
        &self,
        phone_number: &str,
        message: &str,
        media_url: Option<&str>,
    ) -> DispatchAction {
        let user_id = phone_number.to_string();
        if let Err(e) = self.db.save_user(&user_id, phone_number, "") {
            log::error!("Failed to save user {}: {}", user_id, e);
        }

        // Classification reads the history as it stood when this message
        // arrived; fetching after the save would shift every lookback window
        // by one and push the oldest qualifying turn out of range.
        let history = self
            .db
            .get_recent(&user_id, CLASSIFY_LOOKBACK)
            .unwrap_or_default();

        // Persist the inbound turn before anything can fail downstream.
        match self
            .db
            .save_turn(&user_id, Some(message), media_url, false, None)
        {
            Ok(turn) => self.sessions.record_turn(&user_id, turn),
            Err(e) => log::error!("Failed to persist inbound turn for {}: {}", user_id, e),
        }

        if let Some(url) = media_url {
            return self.handle_image(&user_id, phone_number, url).await;
        }

        let trimmed = message.trim();
        if trimmed.is_empty() {
            self.outbound
                .deliver(&user_id, phone_number, HELP_MESSAGE, None)
                .await;
            return DispatchAction::Help;
        }

        match intent::classify(trimmed, &history) {
            IntentDecision::DirectCallRequest => {
                self.trigger_call(&user_id, phone_number, TriggerReason::DirectRequest, trimmed)
                    .await
            }
            IntentDecision::VoiceBotConfirmation => {
                self.trigger_call(&user_id, phone_number, TriggerReason::ConfirmedOffer, trimmed)
                    .await
            }
            IntentDecision::ProgressQuery => {
                let report = self.progress_report(&user_id);
                self.outbound
                    .deliver(&user_id, phone_number, &report, Some("progress_update"))
                    .await;
                DispatchAction::ProgressReport
            }
            IntentDecision::FollowUp(follow_up) => {
                let ctx = followup::last_analysis_info(&history);
                let answer = self
                    .followups
                    .generate(follow_up, &ctx.crop_type, &ctx.disease, &history)
                    .await;
                self.outbound
                    .deliver(&user_id, phone_number, &answer, None)
                    .await;
                self.outbound
                    .deliver(&user_id, phone_number, &followup::menu_response(), None)
                    .await;
                DispatchAction::FollowUp
            }
            IntentDecision::General => self.general_chat(&user_id, phone_number, trimmed).await,
        }
    }

    async fn trigger_call(
        &self,
        user_id: &str,
        phone_number: &str,
        reason: TriggerReason,
        message: &str,
    ) -> DispatchAction {
        let trigger = CallTrigger::new(user_id, phone_number, reason, message);
        let outcome = self.calls.initiate(&trigger).await;
        match outcome.status {
            CallStatus::Sent => DispatchAction::CallInitiated,
            CallStatus::Failed => DispatchAction::CallFailed,
            CallStatus::Skipped => DispatchAction::CallSkipped,
        }
    }

    async fn general_chat(
        &self,
        user_id: &str,
        phone_number: &str,
        message: &str,
    ) -> DispatchAction {
        let info = self.sessions.touch(user_id);
        let mut window = self
            .sessions
            .get_context_window(user_id, self.context_window_turns);
        // The inbound turn was already recorded; it goes last, not twice.
        if window
            .last()
            .map_or(false, |t| !t.is_bot && t.text_or_empty() == message)
        {
            window.pop();
        }

        let mut messages = vec![Message::system(
            "You are KHETI AI EXPERT, a friendly agricultural assistant for Indian \
             farmers on WhatsApp. Answer in Hindi with English technical terms in \
             brackets. Be specific about products, dosages and timing. Keep answers \
             under 300 words. If the user mentions a crop, end your reply with a \
             final line 'CROP_TYPE: <crop in english, lowercase>'.",
        )];
        for turn in &window {
            let text = turn.text_or_empty();
            if text.is_empty() {
                continue;
            }
            if turn.is_bot {
                messages.push(Message::assistant(text));
            } else {
                messages.push(Message::user(text));
            }
        }
        messages.push(Message::user(message));

        let (mut reply, tag) = match self
            .ai
            .complete(messages, CHAT_MAX_TOKENS, CHAT_TEMPERATURE)
            .await
        {
            Ok(text) => extract_crop_tag(&text),
            Err(e) => {
                log::error!("Chat completion failed for {}: {}", user_id, e.message);
                (APOLOGY_MESSAGE.to_string(), None)
            }
        };

        if info.message_count >= LONG_SESSION_THRESHOLD {
            reply.push_str(LONG_SESSION_HINT);
        } else if info.message_count > 0 && info.message_count % CALL_HINT_EVERY == 0 {
            reply.push_str(CALL_HINT);
        }

        self.outbound
            .deliver(user_id, phone_number, &reply, tag.as_deref())
            .await;
        DispatchAction::GeneralReply
    }

    async fn handle_image(
        &self,
        user_id: &str,
        phone_number: &str,
        media_url: &str,
    ) -> DispatchAction {
        self.outbound
            .deliver(user_id, phone_number, IMAGE_ACK_MESSAGE, None)
            .await;

        let image = match self.transport.fetch_media(media_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Media download failed for {}: {}", user_id, e);
                self.outbound
                    .deliver(user_id, phone_number, IMAGE_FAIL_MESSAGE, None)
                    .await;
                return DispatchAction::ImageAnalysis;
            }
        };

        let encoded = BASE64.encode(&image);
        let messages = vec![
            Message::system(
                "You are KHETI AI EXPERT, a plant pathologist for Indian farmers. \
                 Analyze the crop photo and reply in Hindi with English technical \
                 terms. Use exactly this structure:\n\
                 फसल (Crop Type): <crop>\n\
                 बीमारी (Disease): <disease or 'स्वस्थ'>\n\
                 लक्षण (Symptoms): <what you see>\n\
                 इलाज (Treatment): <products and dosage>\n\
                 रोकथाम (Prevention): <two or three steps>\n\
                 End with a final line 'CROP_TYPE: <crop in english, lowercase>'.",
            ),
            Message::user(format!("data:image/jpeg;base64,{}", encoded)),
        ];

        match self
            .ai
            .complete(messages, ANALYSIS_MAX_TOKENS, ANALYSIS_TEMPERATURE)
            .await
        {
            Ok(analysis) => {
                let (report, tag) = extract_crop_tag(&analysis);
                self.outbound
                    .deliver(user_id, phone_number, &report, tag.as_deref())
                    .await;
                self.outbound
                    .deliver(user_id, phone_number, &followup::menu_response(), None)
                    .await;
                self.outbound
                    .deliver(user_id, phone_number, &voice_offer_message(), None)
                    .await;
            }
            Err(e) => {
                log::error!("Image analysis failed for {}: {}", user_id, e.message);
                self.outbound
                    .deliver(user_id, phone_number, IMAGE_FAIL_MESSAGE, None)
                    .await;
            }
        }

        DispatchAction::ImageAnalysis
    }

    /// Deterministic progress report from persisted history. No model call.
    fn progress_report(&self, user_id: &str) -> String {
        let recent = self
            .db
            .get_recent(user_id, PROGRESS_LOOKBACK)
            .unwrap_or_default();

        let completed_calls = recent
            .iter()
            .filter(|t| t.tag_or_empty() == crate::summary::SUMMARY_TAG)
            .count();
        let last_summary = recent
            .iter()
            .find(|t| t.tag_or_empty() == crate::summary::SUMMARY_TAG)
            .and_then(|t| t.text.clone());

        if let Some(summary) = last_summary {
            let snippet: String = summary.chars().take(300).collect();
            return format!(
                "📋 आपकी पिछली सलाह (Your last treatment plan):\n\n{}\n\n\
                 📞 पूरी हुई कॉल (Completed calls): {}\n\n\
                 💬 सलाह का पालन करने के बाद बताएं कि फसल कैसी है। \
                 (After following the advice, tell me how the crop is doing.)",
                snippet, completed_calls
            );
        }

        if !recent.is_empty() {
            return "📋 अभी कोई treatment plan नहीं बना है। (No treatment plan yet.)\n\n\
                    📷 अपनी फसल की फोटो भेजें या 'call करें' लिखें ताकि पूरी सलाह मिल सके।"
                .to_string();
        }

        "🌾 नमस्ते! अभी तक कोई बातचीत नहीं हुई है। (No conversation yet.)\n\n\
         📷 शुरू करने के लिए फसल की फोटो भेजें या अपनी समस्या लिखें।"
            .to_string()
    }
}
