//! Integration tests for the inbound pipeline's routing invariants.
//!
//! Every inbound event must take exactly one intent path and must end with
//! at least one user-visible message, including when the dialer or the model
//! backend is down.

use std::sync::Arc;

use crate::ai::{AiClient, AiError, MockAiClient};
use crate::calls::{CallOrchestrator, VoiceDialerClient};
use crate::channels::MockTransport;
use crate::config::{defaults, Config};
use crate::db::Database;
use crate::dispatch::{voice_offer_message, DispatchAction, MessageDispatcher, OutboundDispatcher};
use crate::followup;
use crate::session::SessionManager;

/// Test harness wiring an in-memory database, a capturing transport, a mock
/// AI client, and a dialer pointed at an unroutable endpoint (every dial
/// attempt fails fast with a connection error).
struct TestHarness {
    db: Arc<Database>,
    dispatcher: MessageDispatcher,
    transport: Arc<MockTransport>,
    ai: MockAiClient,
}

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

impl TestHarness {
    fn new(mock_responses: Vec<Result<String, AiError>>) -> Self {
        Self::with_transport(Arc::new(MockTransport::new()), mock_responses)
    }

    fn with_transport(
        transport: Arc<MockTransport>,
        mock_responses: Vec<Result<String, AiError>>,
    ) -> Self {
        let config = test_config();
        let db = Arc::new(Database::new(":memory:").expect("in-memory db"));

        let sessions = Arc::new(SessionManager::new(
            db.clone(),
            config.session_ttl_minutes,
            config.context_window_turns,
        ));
        let outbound = Arc::new(OutboundDispatcher::new(
            db.clone(),
            sessions.clone(),
            transport.clone(),
        ));

        let mock = MockAiClient::new(mock_responses);
        let ai = Arc::new(AiClient::Mock(mock.clone()));

        let dialer = VoiceDialerClient::from_config(&config).expect("dialer client");
        let calls = Arc::new(CallOrchestrator::new(
            db.clone(),
            outbound.clone(),
            dialer,
            ai.clone(),
            &config,
        ));

        let dispatcher = MessageDispatcher::new(
            db.clone(),
            sessions,
            outbound,
            transport.clone(),
            ai,
            calls,
            &config,
        );

        TestHarness {
            db,
            dispatcher,
            transport,
            ai: mock,
        }
    }

    /// Seed a persisted bot turn, as if the bot had sent it earlier.
    fn seed_bot_turn(&self, user_id: &str, text: &str, tag: Option<&str>) {
        self.db
            .save_turn(user_id, Some(text), None, true, tag)
            .expect("seed turn");
    }
}

const PHONE: &str = "+918044475773";

#[tokio::test]
async fn direct_call_request_acks_then_reports_the_dial_failure() {
    let harness = TestHarness::new(vec![]);

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "call करें", None)
        .await;

    assert_eq!(action, DispatchAction::CallFailed);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains("कॉल शुरू हो रही है"));
    assert!(sent[1].contains("तकनीकी समस्या"));
    // The fallback names the human helpline.
    assert!(sent[1].contains(defaults::SUPPORT_PHONE));
    // The only model call is the diagnostic-question pass, which fails here
    // and falls back to the fixed question set before the dial.
    assert_eq!(harness.ai.call_count(), 1);
}

#[tokio::test]
async fn affirmative_without_an_offer_is_general_chat() {
    let harness = TestHarness::new(vec![Ok("जी, बताइए क्या समस्या है?".to_string())]);

    let action = harness.dispatcher.handle_inbound(PHONE, "yes", None).await;

    assert_eq!(action, DispatchAction::GeneralReply);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("बताइए"));
    assert_eq!(harness.ai.call_count(), 1);
}

#[tokio::test]
async fn affirmative_after_a_voice_offer_dials_without_an_ack() {
    let harness = TestHarness::new(vec![]);
    harness.seed_bot_turn(PHONE, &voice_offer_message(), None);

    let action = harness.dispatcher.handle_inbound(PHONE, "हाँ", None).await;

    // Dialer is unreachable, so the path ends in the failure fallback, but
    // a confirmation never sends the pre-dial ack.
    assert_eq!(action, DispatchAction::CallFailed);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("तकनीकी समस्या"));
}

#[tokio::test]
async fn offer_five_turns_back_still_confirms() {
    let harness = TestHarness::new(vec![]);
    harness.seed_bot_turn(PHONE, &voice_offer_message(), None);
    // Four later bot turns push the offer to the edge of the lookback. The
    // confirmation window counts prior turns only; the inbound "yes" itself
    // must not eat a slot.
    for n in 1..=4 {
        harness.seed_bot_turn(PHONE, &format!("ठीक है ({})", n), None);
    }

    let action = harness.dispatcher.handle_inbound(PHONE, "yes", None).await;

    assert_eq!(action, DispatchAction::CallFailed);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("तकनीकी समस्या"));
}

#[tokio::test]
async fn follow_up_keyword_after_menu_answers_from_template() {
    let harness = TestHarness::new(vec![]);
    harness.seed_bot_turn(PHONE, "फसल: टमाटर\nबीमारी: झुलसा", Some("tomato"));
    harness.seed_bot_turn(PHONE, &followup::menu_response(), None);

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "रोकथाम", None)
        .await;

    assert_eq!(action, DispatchAction::FollowUp);
    let sent = harness.transport.sent_texts();
    // The answer, then the menu again to keep the loop open.
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains("रोकथाम इलाज से बेहतर है"));
    assert!(sent[1].contains("और भी जानकारी चाहिए"));
    // Prevention is templated; the model is never consulted.
    assert_eq!(harness.ai.call_count(), 0);
}

#[tokio::test]
async fn follow_up_keyword_without_menu_context_goes_to_general_chat() {
    let harness = TestHarness::new(vec![Ok("रोकथाम के लिए...".to_string())]);

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "रोकथाम", None)
        .await;

    assert_eq!(action, DispatchAction::GeneralReply);
    assert_eq!(harness.ai.call_count(), 1);
}

#[tokio::test]
async fn progress_query_replays_the_last_call_summary() {
    let harness = TestHarness::new(vec![]);
    harness.seed_bot_turn(
        PHONE,
        "समस्या: झुलसा। इलाज: Mancozeb 2g/L।",
        Some(crate::summary::SUMMARY_TAG),
    );

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "progress", None)
        .await;

    assert_eq!(action, DispatchAction::ProgressReport);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("पिछली सलाह"));
    assert!(sent[0].contains("Mancozeb"));
    assert_eq!(harness.ai.call_count(), 0);
}

#[tokio::test]
async fn progress_query_with_no_history_asks_to_start() {
    let harness = TestHarness::new(vec![]);

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "status", None)
        .await;

    assert_eq!(action, DispatchAction::ProgressReport);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("कोई बातचीत नहीं"));
}

#[tokio::test]
async fn image_analysis_sends_report_menu_and_voice_offer() {
    let transport = Arc::new(MockTransport::with_media(vec![0xFF, 0xD8, 0xFF]));
    let harness = TestHarness::with_transport(
        transport,
        vec![Ok(
            "फसल (Crop Type): टमाटर\nबीमारी (Disease): झुलसा\nइलाज: Mancozeb\nCROP_TYPE: tomato"
                .to_string(),
        )],
    );

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "", Some("https://media.test/photo.jpg"))
        .await;

    assert_eq!(action, DispatchAction::ImageAnalysis);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 4);
    assert!(sent[0].contains("फोटो मिल गई"));
    assert!(sent[1].contains("झुलसा"));
    assert!(!sent[1].contains("CROP_TYPE"));
    assert!(sent[2].contains("और भी जानकारी चाहिए"));
    assert!(sent[3].contains("KHETI AI EXPERT"));

    // The report is persisted tagged with the extracted crop.
    let recent = harness.db.get_recent(PHONE, 10).unwrap();
    assert!(recent
        .iter()
        .any(|t| t.is_bot && t.tag_or_empty() == "tomato"));
}

#[tokio::test]
async fn model_failure_still_delivers_an_apology() {
    let harness = TestHarness::new(vec![Err(AiError::transient("backend down"))]);

    let action = harness
        .dispatcher
        .handle_inbound(PHONE, "मेरी फसल पीली हो रही है", None)
        .await;

    assert_eq!(action, DispatchAction::GeneralReply);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("क्षमा करें"));
}

#[tokio::test]
async fn empty_message_gets_the_help_text() {
    let harness = TestHarness::new(vec![]);

    let action = harness.dispatcher.handle_inbound(PHONE, "  ", None).await;

    assert_eq!(action, DispatchAction::Help);
    let sent = harness.transport.sent_texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("खेती सहायक"));
}

#[tokio::test]
async fn inbound_turn_is_persisted_even_when_everything_downstream_fails() {
    let harness = TestHarness::new(vec![Err(AiError::transient("backend down"))]);

    harness
        .dispatcher
        .handle_inbound(PHONE, "गेहूं में रतुआ", None)
        .await;

    let recent = harness.db.get_recent(PHONE, 10).unwrap();
    assert!(recent
        .iter()
        .any(|t| !t.is_bot && t.text_or_empty() == "गेहूं में रतुआ"));
}
