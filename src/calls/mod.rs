//! Outbound voice-call orchestration.
//!
//! One state machine per inbound event: Idle -> (Acknowledging ->)
//! Dispatching -> {Sent|Failed}, with Skipped for a duplicate concurrent
//! trigger on the same user. Failures are never retried automatically; the
//! user re-triggers with a new message.

use dashmap::DashMap;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::{AiClient, Message};
use crate::config::Config;
use crate::db::Database;
use crate::dispatch::OutboundDispatcher;
use crate::models::{CallOutcome, CallTrigger, ConversationTurn, TriggerReason};

const DIAL_TIMEOUT_SECS: u64 = 30;
/// Per-turn character cap when embedding conversation context in the voice
/// agent's system instruction (dialer payload limit).
const CONTEXT_TURN_CHARS: usize = 100;
const CONTEXT_TURNS: usize = 5;
/// The voice agent gets exactly this many diagnostic questions to work with.
const QUESTION_COUNT: usize = 5;
const QUESTION_MAX_TOKENS: u32 = 500;
const QUESTION_TEMPERATURE: f32 = 0.3;

/// Fallback diagnostic questions when there is no usable history or the
/// model is down. The call still needs an interview plan.
const BASIC_QUESTIONS: [&str; 5] = [
    "What type of crop are you growing and how old is it?",
    "Can you describe the main problem you're seeing with your crop?",
    "When did you first notice these symptoms?",
    "How has the weather been in your area recently?",
    "Have you applied any fertilizers or pesticides recently?",
];

fn basic_questions() -> Vec<String> {
    BASIC_QUESTIONS.iter().map(|q| q.to_string()).collect()
}

/// Pull numbered questions ("1. ...") out of a model response, in order.
fn parse_questions(response: &str) -> Vec<String> {
    response
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (number, rest) = line.split_once('.')?;
            if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let question = rest.trim();
            (!question.is_empty()).then(|| question.to_string())
        })
        .collect()
}

/// Builds the diagnostic interview plan for the voice agent: five questions
/// targeting whatever the conversation so far has not established.
pub struct QuestionGenerator {
    ai: Arc<AiClient>,
}

impl QuestionGenerator {
    pub fn new(ai: Arc<AiClient>) -> Self {
        Self { ai }
    }

    pub async fn generate(&self, context: &str) -> Vec<String> {
        if context.trim().is_empty() {
            return basic_questions();
        }

        let messages = vec![
            Message::system(
                "You are the diagnostic module of KHETI AI EXPERT, an agricultural \
                 assistant for Indian farmers. From the conversation history, work \
                 out which crucial details are still missing to diagnose the crop \
                 problem and recommend a treatment: crop and variety, symptoms, \
                 onset and spread, weather and irrigation, and chemicals already \
                 applied. Reply with exactly five short questions, numbered 1. to \
                 5., in simple English suitable for a phone conversation. Do not \
                 re-ask anything the farmer has already answered.",
            ),
            Message::user(format!("Conversation history:\n{}", context)),
        ];

        match self
            .ai
            .complete(messages, QUESTION_MAX_TOKENS, QUESTION_TEMPERATURE)
            .await
        {
            Ok(text) => {
                let mut questions = parse_questions(&text);
                if questions.len() < QUESTION_COUNT {
                    questions.extend(basic_questions());
                }
                questions.truncate(QUESTION_COUNT);
                questions
            }
            Err(e) => {
                log::warn!("Question generation failed, using the basic set: {}", e.message);
                basic_questions()
            }
        }
    }
}

pub const GREETING_TEXT: &str = "Namaste! Main aapka Krishi Sahayak Voice-Bot hun. \
    Aap apni fasal ki samasya bata sakte hain. Hello! I'm your Agricultural \
    Assistant Voice-Bot. You can tell me about your crop problems.";

/// Normalize a phone number to the dialer's required local form: strip a
/// leading `+`, strip the country code prefix if present, prepend `0`.
/// `+918044475773` with prefix `91` becomes `08044475773`.
pub fn normalize_phone_number(raw: &str, country_prefix: &str) -> String {
    let digits = raw.trim().trim_start_matches('+');
    let local = digits.strip_prefix(country_prefix).unwrap_or(digits);
    format!("0{}", local)
}

/// Inverse of [`normalize_phone_number`]: map the dialer's local form back to
/// the international user id. `08044475773` with prefix `91` becomes
/// `+918044475773`. Numbers already in international form pass through.
pub fn denormalize_phone_number(local: &str, country_prefix: &str) -> String {
    let local = local.trim();
    if local.starts_with('+') {
        return local.to_string();
    }
    // A leading 0 marks the dialer's local form; what follows is always a
    // bare subscriber number.
    if let Some(digits) = local.strip_prefix('0') {
        return format!("+{}{}", country_prefix, digits);
    }
    if local.starts_with(country_prefix) {
        format!("+{}", local)
    } else {
        format!("+{}{}", country_prefix, local)
    }
}

/// Render the most recent turns (most-recent-first input) into a short
/// context block, each turn truncated to the per-turn cap.
pub fn build_call_context(turns: &[ConversationTurn]) -> String {
    let mut context = String::new();
    for turn in turns.iter().take(CONTEXT_TURNS).rev() {
        let text = turn.text_or_empty();
        if text.is_empty() {
            continue;
        }
        let speaker = if turn.is_bot { "Bot" } else { "Farmer" };
        let truncated: String = text.chars().take(CONTEXT_TURN_CHARS).collect();
        context.push_str(&format!("{}: {}\n", speaker, truncated));
    }
    context
}

#[derive(Debug, Clone)]
pub struct DialError {
    pub message: String,
    pub timeout: bool,
}

impl std::fmt::Display for DialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Serialize)]
struct DialRequest {
    #[serde(rename = "Voicechat_id")]
    voicechat_id: String,
    ai_agent_ext: i64,
    customer_no: String,
    text: String,
    system_msg: String,
}

/// Client for the external voice-dialer provider.
pub struct VoiceDialerClient {
    client: Client,
    endpoint: String,
    auth_token: String,
    voicechat_id: String,
    agent_ext: i64,
}

impl VoiceDialerClient {
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DIAL_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: config.dialer_endpoint.clone(),
            auth_token: config.dialer_auth_token.clone(),
            voicechat_id: config.dialer_voicechat_id.clone(),
            agent_ext: config.dialer_agent_ext,
        })
    }

    /// One dial attempt. HTTP 200 means the call was accepted; anything else
    /// is a failure.
    pub async fn dial(
        &self,
        customer_no: &str,
        greeting: &str,
        system_msg: &str,
    ) -> Result<(), DialError> {
        let request = DialRequest {
            voicechat_id: self.voicechat_id.clone(),
            ai_agent_ext: self.agent_ext,
            customer_no: customer_no.to_string(),
            text: greeting.to_string(),
            system_msg: system_msg.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .json(&request)
            .send()
            .await
            .map_err(|e| DialError {
                timeout: e.is_timeout(),
                message: format!("Dialer request failed: {}", e),
            })?;

        let status = response.status();
        if status.as_u16() != 200 {
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_default();
            return Err(DialError {
                timeout: false,
                message: format!("Dialer returned {}: {}", status, detail),
            });
        }

        Ok(())
    }
}

const ACK_MESSAGE: &str = "📞 कॉल शुरू हो रही है! (Call starting!)\n\n\
    🎙️ आपकी कॉल 30 सेकंड में आएगी:\n\
    • फोन की रिंग का इंतज़ार करें (Wait for the ring)\n\
    • अपनी समस्या स्पष्ट रूप से बताएं (Describe your problem clearly)\n\
    • हिंदी या English में बात कर सकते हैं\n\n\
    ⏳ कृपया प्रतीक्षा करें... (Please wait...)";

const SENT_MESSAGE: &str = "✅ कॉल सफलतापूर्वक शुरू हुई! (Call initiated!)\n\
    📲 कृपया फोन उठाएं। (Please pick up the phone.)\n\n\
    💡 कॉल के बाद आपको WhatsApp पर पूरा treatment plan मिलेगा।";

fn failed_message(support_phone: &str) -> String {
    format!(
        "❌ कॉल में तकनीकी समस्या (Technical problem with the call)\n\n\
         🔄 वैकल्पिक तरीके (Alternatives):\n\
         • 5 मिनट बाद 'call करें' लिख कर भेजें (Try again in 5 minutes)\n\
         • अपनी फसल की फोटो भेजें (Send a crop photo)\n\
         • समस्या टेक्स्ट में लिखें (Describe the problem in text)\n\n\
         📞 Direct Call: {}",
        support_phone
    )
}

pub struct CallOrchestrator {
    db: Arc<Database>,
    outbound: Arc<OutboundDispatcher>,
    dialer: VoiceDialerClient,
    questions: QuestionGenerator,
    country_prefix: String,
    support_phone: String,
    /// Guards against two concurrent events dialing the same user.
    in_flight: DashMap<String, ()>,
}

impl CallOrchestrator {
    pub fn new(
        db: Arc<Database>,
        outbound: Arc<OutboundDispatcher>,
        dialer: VoiceDialerClient,
        ai: Arc<AiClient>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            outbound,
            dialer,
            questions: QuestionGenerator::new(ai),
            country_prefix: config.country_code_prefix.clone(),
            support_phone: config.support_phone.clone(),
            in_flight: DashMap::new(),
        }
    }

    fn system_message(&self, trigger: &CallTrigger, context: &str, questions: &[String]) -> String {
        let numbered: Vec<String> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {}", i + 1, q))
            .collect();
        format!(
            "You are KHETI AI EXPERT, an agricultural assistant voice bot for Indian \
             farmers. You speak Hindi and English fluently.\n\n\
             FARMER CONTEXT:\n\
             - Phone: {}\n\
             - Trigger: {} (\"{}\")\n\
             - Recent conversation:\n{}\n\
             DIAGNOSTIC QUESTIONS TO ASK (one at a time):\n{}\n\n\
             Greet warmly, work through the questions to understand the crop \
             problem, give practical local advice, and mention the WhatsApp \
             follow-up with the detailed treatment plan.",
            trigger.phone_number,
            trigger.reason.as_str(),
            trigger.trigger_message,
            context,
            numbered.join("\n"),
        )
    }

    /// Issue one outbound voice call for this trigger. At most one dial per
    /// user is in flight at a time; a concurrent duplicate is Skipped.
    pub async fn initiate(&self, trigger: &CallTrigger) -> CallOutcome {
        let user_id = trigger.user_id.clone();
        if self.in_flight.insert(user_id.clone(), ()).is_some() {
            log::info!("Suppressing duplicate concurrent dial for {}", user_id);
            return CallOutcome::skipped("call already in progress for this user");
        }

        let outcome = self.dispatch(trigger).await;
        self.in_flight.remove(&user_id);
        outcome
    }

    async fn dispatch(&self, trigger: &CallTrigger) -> CallOutcome {
        // Acknowledging: direct requests get an immediate heads-up; a "yes"
        // confirmation already follows a visible offer.
        if trigger.reason == TriggerReason::DirectRequest {
            self.outbound
                .deliver(&trigger.user_id, &trigger.phone_number, ACK_MESSAGE, None)
                .await;
        }

        let recent = self
            .db
            .get_recent(&trigger.user_id, CONTEXT_TURNS * 2)
            .unwrap_or_default();
        let context = build_call_context(&recent);
        let questions = self.questions.generate(&context).await;
        let system_msg = self.system_message(trigger, &context, &questions);
        let customer_no = normalize_phone_number(&trigger.phone_number, &self.country_prefix);

        log::info!(
            "Dialing {} (normalized {}) for {} [{}]",
            trigger.phone_number,
            customer_no,
            trigger.user_id,
            trigger.reason.as_str()
        );

        match self.dialer.dial(&customer_no, GREETING_TEXT, &system_msg).await {
            Ok(()) => {
                self.outbound
                    .deliver(&trigger.user_id, &trigger.phone_number, SENT_MESSAGE, None)
                    .await;
                CallOutcome::sent()
            }
            Err(e) => {
                log::error!("Dial failed for {}: {}", trigger.user_id, e);
                self.outbound
                    .deliver(
                        &trigger.user_id,
                        &trigger.phone_number,
                        &failed_message(&self.support_phone),
                        None,
                    )
                    .await;
                let reason = if e.timeout {
                    "dialer timed out".to_string()
                } else {
                    e.message
                };
                CallOutcome::failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::ai::{AiError, MockAiClient};
    use crate::channels::MockTransport;
    use crate::config::defaults;
    use crate::models::CallStatus;
    use crate::session::SessionManager;

    fn test_config() -> Config {
        Config {
            port: 0,
            database_url: ":memory:".to_string(),
            ai_endpoint: "http://mock.test/v1/chat/completions".to_string(),
            ai_api_key: String::new(),
            ai_model: "mock".to_string(),
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_whatsapp_from: String::new(),
            dialer_endpoint: "http://127.0.0.1:1/dial".to_string(),
            dialer_auth_token: "test-token".to_string(),
            dialer_voicechat_id: "test-chat".to_string(),
            dialer_agent_ext: 100,
            country_code_prefix: defaults::COUNTRY_CODE_PREFIX.to_string(),
            session_ttl_minutes: 30,
            context_window_turns: 20,
            support_phone: defaults::SUPPORT_PHONE.to_string(),
        }
    }

    fn orchestrator() -> (CallOrchestrator, Arc<MockTransport>) {
        let config = test_config();
        let db = Arc::new(Database::new(":memory:").expect("in-memory db"));
        let sessions = Arc::new(SessionManager::new(
            db.clone(),
            config.session_ttl_minutes,
            config.context_window_turns,
        ));
        let transport = Arc::new(MockTransport::new());
        let outbound = Arc::new(OutboundDispatcher::new(
            db.clone(),
            sessions,
            transport.clone(),
        ));
        let ai = Arc::new(AiClient::Mock(MockAiClient::failing()));
        let dialer = VoiceDialerClient::from_config(&config).expect("dialer client");
        let orchestrator = CallOrchestrator::new(db, outbound, dialer, ai, &config);
        (orchestrator, transport)
    }

    #[test]
    fn normalizes_indian_numbers_for_the_dialer() {
        assert_eq!(normalize_phone_number("+918044475773", "91"), "08044475773");
        assert_eq!(normalize_phone_number("918044475773", "91"), "08044475773");
        assert_eq!(normalize_phone_number("+8044475773", "91"), "08044475773");
    }

    #[test]
    fn denormalization_round_trips_the_dialer_form() {
        assert_eq!(
            denormalize_phone_number("08044475773", "91"),
            "+918044475773"
        );
        assert_eq!(
            denormalize_phone_number("+918044475773", "91"),
            "+918044475773"
        );
        let normalized = normalize_phone_number("+918044475773", "91");
        assert_eq!(denormalize_phone_number(&normalized, "91"), "+918044475773");
        // Subscriber numbers that happen to start with the prefix digits.
        let tricky = normalize_phone_number("+919191000000", "91");
        assert_eq!(denormalize_phone_number(&tricky, "91"), "+919191000000");
    }

    #[test]
    fn normalization_strips_prefix_only_once() {
        // A local number that merely starts with 9-1 digits after the code.
        assert_eq!(normalize_phone_number("+919191000000", "91"), "09191000000");
    }

    fn turn(text: &str, is_bot: bool) -> ConversationTurn {
        ConversationTurn {
            id: 0,
            user_id: "u".into(),
            text: Some(text.to_string()),
            media: None,
            is_bot,
            tag: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn call_context_takes_five_turns_truncated() {
        let long = "क".repeat(300);
        let turns = vec![
            turn(&long, false),
            turn("b1", true),
            turn("u1", false),
            turn("b2", true),
            turn("u2", false),
            turn("dropped", false),
        ];
        let context = build_call_context(&turns);
        assert!(!context.contains("dropped"));
        // Oldest of the five comes first.
        assert!(context.starts_with("Farmer: u2"));
        // Per-turn truncation respected on the long most-recent turn.
        let last_line = context.lines().last().unwrap();
        assert!(last_line.chars().count() <= CONTEXT_TURN_CHARS + "Farmer: ".len());
    }

    #[test]
    fn media_only_turns_are_skipped_in_context() {
        let mut media_turn = turn("", false);
        media_turn.text = None;
        let context = build_call_context(&[media_turn, turn("hello", false)]);
        assert_eq!(context, "Farmer: hello\n");
    }

    #[test]
    fn numbered_lines_parse_into_questions() {
        let response = "Here are the questions:\n\
                        1. What crop are you growing?\n\
                        2. When did the spots appear?\n\
                        Some commentary in between.\n\
                        3. Have you sprayed anything?\n";
        let questions = parse_questions(response);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "What crop are you growing?");
        assert_eq!(questions[2], "Have you sprayed anything?");
    }

    #[tokio::test]
    async fn question_generation_backfills_short_model_output() {
        let mock = MockAiClient::new(vec![Ok(
            "1. What variety of tomato is it?\n2. How old are the plants?".to_string(),
        )]);
        let generator = QuestionGenerator::new(Arc::new(AiClient::Mock(mock)));
        let questions = generator.generate("Farmer: टमाटर में धब्बे\n").await;
        assert_eq!(questions.len(), QUESTION_COUNT);
        assert_eq!(questions[0], "What variety of tomato is it?");
        // Topped up from the fixed set, in order.
        assert_eq!(questions[2], BASIC_QUESTIONS[0]);
    }

    #[tokio::test]
    async fn question_generation_falls_back_when_the_model_is_down() {
        let mock = MockAiClient::new(vec![Err(AiError::transient("backend down"))]);
        let generator = QuestionGenerator::new(Arc::new(AiClient::Mock(mock)));
        let questions = generator.generate("Farmer: गेहूं पीला\n").await;
        assert_eq!(questions, basic_questions());
    }

    #[tokio::test]
    async fn empty_history_skips_the_model_entirely() {
        let mock = MockAiClient::failing();
        let generator = QuestionGenerator::new(Arc::new(AiClient::Mock(mock.clone())));
        let questions = generator.generate("").await;
        assert_eq!(questions, basic_questions());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_trigger_for_the_same_user_is_skipped() {
        let (orchestrator, transport) = orchestrator();
        let user = "+918044475773";
        // Simulate a dial already in progress for this user.
        orchestrator.in_flight.insert(user.to_string(), ());

        let trigger = CallTrigger::new(user, user, TriggerReason::DirectRequest, "call करें");
        let outcome = orchestrator.initiate(&trigger).await;

        assert_eq!(outcome.status, CallStatus::Skipped);
        // Nothing sent, not even the pre-dial ack.
        assert!(transport.sent_texts().is_empty());
        // The original dial still owns the guard entry.
        assert!(orchestrator.in_flight.contains_key(user));
    }

    #[tokio::test]
    async fn guard_entry_is_released_after_a_failed_dial() {
        let (orchestrator, transport) = orchestrator();
        let user = "+918044475773";

        let trigger = CallTrigger::new(user, user, TriggerReason::DirectRequest, "call करें");
        let outcome = orchestrator.initiate(&trigger).await;

        // Unroutable dialer endpoint: the dial fails, the user hears about it,
        // and a later trigger is free to dial again.
        assert_eq!(outcome.status, CallStatus::Failed);
        assert!(!orchestrator.in_flight.contains_key(user));
        assert!(transport
            .sent_texts()
            .iter()
            .any(|m| m.contains("तकनीकी समस्या")));
    }
}
