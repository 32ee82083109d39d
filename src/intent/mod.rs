//! Inbound message classification.
//!
//! A pure function over the message text and the recent bot turns; no network
//! or store access. Exactly one variant is returned per message, checked in a
//! fixed precedence order: direct call > voice-bot confirmation > progress >
//! follow-up > general. Direct call requests must never be swallowed by
//! follow-up keyword matching.

use crate::models::ConversationTurn;

/// Markers embedded in outbound bot messages that later gate classification.
pub mod markers {
    /// Both substrings must appear in a bot turn for it to count as a
    /// voice-call offer.
    pub const VOICE_OFFER_EMOJI: &str = "🎙️";
    pub const VOICE_OFFER_NAME: &str = "KHETI AI EXPERT";

    /// Any of these marks a bot turn as the follow-up menu.
    pub const FOLLOW_UP_MENU: &[&str] = &[
        "और भी जानकारी चाहिए",
        "आपकी समस्या का समाधान मिल गया है",
    ];
}

/// How many recent turns are searched for the voice-offer marker.
const VOICE_OFFER_LOOKBACK: usize = 5;
/// How many recent turns are searched for the follow-up menu marker.
const FOLLOW_UP_LOOKBACK: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowUpIntent {
    Treatment,
    Prevention,
    Medicine,
    Dosage,
    Cost,
    Management,
    Timing,
    Emergency,
}

impl FollowUpIntent {
    /// Declaration order doubles as the classification tie-break order.
    pub const ALL: [FollowUpIntent; 8] = [
        FollowUpIntent::Treatment,
        FollowUpIntent::Prevention,
        FollowUpIntent::Medicine,
        FollowUpIntent::Dosage,
        FollowUpIntent::Cost,
        FollowUpIntent::Management,
        FollowUpIntent::Timing,
        FollowUpIntent::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FollowUpIntent::Treatment => "treatment",
            FollowUpIntent::Prevention => "prevention",
            FollowUpIntent::Medicine => "medicine",
            FollowUpIntent::Dosage => "dosage",
            FollowUpIntent::Cost => "cost",
            FollowUpIntent::Management => "management",
            FollowUpIntent::Timing => "timing",
            FollowUpIntent::Emergency => "emergency",
        }
    }

    /// Short human-readable summary, used by the intent listing API.
    pub fn description(&self) -> &'static str {
        match self {
            FollowUpIntent::Treatment => "Detailed treatment and cure information",
            FollowUpIntent::Prevention => "Prevention and future care guidelines",
            FollowUpIntent::Medicine => "Medicine and pesticide recommendations",
            FollowUpIntent::Dosage => "Dosage and application quantities",
            FollowUpIntent::Cost => "Cost estimates and budget planning",
            FollowUpIntent::Management => "Crop management and ongoing care",
            FollowUpIntent::Timing => "Treatment timing and schedule",
            FollowUpIntent::Emergency => "Urgent help for severe problems",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "treatment" => Some(FollowUpIntent::Treatment),
            "prevention" => Some(FollowUpIntent::Prevention),
            "medicine" => Some(FollowUpIntent::Medicine),
            "dosage" => Some(FollowUpIntent::Dosage),
            "cost" => Some(FollowUpIntent::Cost),
            "management" => Some(FollowUpIntent::Management),
            "timing" => Some(FollowUpIntent::Timing),
            "emergency" => Some(FollowUpIntent::Emergency),
            _ => None,
        }
    }
}

impl std::fmt::Display for FollowUpIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentDecision {
    DirectCallRequest,
    VoiceBotConfirmation,
    ProgressQuery,
    FollowUp(FollowUpIntent),
    General,
}

/// Call-request phrases, English and Hindi; matched as case-insensitive
/// substrings, independent of any session state.
static CALL_REQUEST_PHRASES: &[&str] = &[
    // English
    "call me",
    "call kar",
    "call karo",
    "call please",
    "phone call",
    "voice call",
    "call back",
    "ring me",
    "phone karo",
    "call now",
    // Hindi
    "कॉल करें",
    "कॉल कर",
    "कॉल करो",
    "फोन करें",
    "फोन करो",
    "बात करना चाहिए",
    "बात करना है",
    "आवाज़ में बात",
    "बोल कर बताएं",
    "कॉल पर बात",
    "फोन पर बात",
    "call करें",
    "call करो",
];

static AFFIRMATIVE_TOKENS: &[&str] = &["yes", "y", "ok", "okay", "han", "haan", "हाँ", "हां"];

/// Exact-match progress keywords (after trim + lowercase).
static PROGRESS_KEYWORDS: &[&str] = &["progress", "status", "update", "प्रोग्रेस", "स्टेटस", "हाल"];

struct IntentKeywords {
    intent: FollowUpIntent,
    english: &'static [&'static str],
    hindi: &'static [&'static str],
}

/// Keyword table for the eight follow-up intents, in tie-break order.
static INTENT_KEYWORDS: &[IntentKeywords] = &[
    IntentKeywords {
        intent: FollowUpIntent::Treatment,
        english: &["treatment", "detailed solution", "treat", "cure", "remedy", "heal", "solution"],
        hindi: &["उपचार", "इलाज", "समाधान", "चिकित्सा", "उपाय"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Prevention,
        english: &["prevention", "protection", "prevent", "avoid", "protect", "precaution", "safety"],
        hindi: &["रोकथाम", "बचाव", "सुरक्षा", "बचना", "रोकना", "सावधानी"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Medicine,
        english: &["medicine", "pesticide", "medication", "spray", "fungicide", "chemical", "insecticide"],
        hindi: &["दवा", "कीटनाशक", "दवाई", "छिड़काव", "रसायन", "केमिकल", "स्प्रे"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Dosage,
        english: &["dosage", "quantity", "amount", "dose", "measurement", "calculation"],
        hindi: &["खुराक", "मात्रा", "डोज", "नाप", "परिमाण"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Cost,
        english: &["cost", "budget", "price", "expense", "money", "rate", "charges"],
        hindi: &["कीमत", "लागत", "खर्च", "दाम", "रेट", "पैसा"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Management,
        english: &["management", "care", "farming", "cultivation", "maintenance", "handling"],
        hindi: &["प्रबंधन", "देखभाल", "खेती", "रखरखाव", "संभाल"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Timing,
        english: &["timing", "calendar", "schedule", "when", "period", "duration"],
        hindi: &["समय", "कैलेंडर", "टाइमिंग", "कब", "अवधि", "समयसारणी"],
    },
    IntentKeywords {
        intent: FollowUpIntent::Emergency,
        english: &["urgent", "emergency", "immediate", "asap", "critical", "serious", "help"],
        hindi: &["तुरंत", "आपातकाल", "जरूरी", "गंभीर", "मदद", "इमरजेंसी"],
    },
];

/// The follow-up keyword table, in tie-break order, for the listing API:
/// (intent, english keywords, hindi keywords).
pub fn intent_catalog(
) -> impl Iterator<Item = (FollowUpIntent, &'static [&'static str], &'static [&'static str])> {
    INTENT_KEYWORDS.iter().map(|k| (k.intent, k.english, k.hindi))
}

fn is_direct_call_request(lower: &str) -> bool {
    CALL_REQUEST_PHRASES.iter().any(|p| lower.contains(p))
}

fn is_voice_offer_turn(turn: &ConversationTurn) -> bool {
    let text = turn.text_or_empty();
    turn.is_bot && text.contains(markers::VOICE_OFFER_EMOJI) && text.contains(markers::VOICE_OFFER_NAME)
}

fn is_voice_bot_confirmation(lower: &str, recent_turns: &[ConversationTurn]) -> bool {
    if !AFFIRMATIVE_TOKENS.contains(&lower) {
        return false;
    }
    recent_turns
        .iter()
        .take(VOICE_OFFER_LOOKBACK)
        .any(is_voice_offer_turn)
}

fn in_follow_up_context(recent_turns: &[ConversationTurn]) -> bool {
    recent_turns.iter().take(FOLLOW_UP_LOOKBACK).any(|turn| {
        turn.is_bot
            && markers::FOLLOW_UP_MENU
                .iter()
                .any(|m| turn.text_or_empty().contains(m))
    })
}

fn detect_follow_up_intent(lower: &str) -> Option<FollowUpIntent> {
    for entry in INTENT_KEYWORDS {
        let matches = entry
            .english
            .iter()
            .chain(entry.hindi.iter())
            .any(|keyword| lower.contains(keyword));
        if matches {
            return Some(entry.intent);
        }
    }
    None
}

/// Classify one inbound message. `recent_turns` come from the message store,
/// most-recent-first.
pub fn classify(message: &str, recent_turns: &[ConversationTurn]) -> IntentDecision {
    let lower = message.trim().to_lowercase();

    if is_direct_call_request(&lower) {
        return IntentDecision::DirectCallRequest;
    }

    if is_voice_bot_confirmation(&lower, recent_turns) {
        return IntentDecision::VoiceBotConfirmation;
    }

    if PROGRESS_KEYWORDS.contains(&lower.as_str()) {
        return IntentDecision::ProgressQuery;
    }

    if in_follow_up_context(recent_turns) {
        if let Some(intent) = detect_follow_up_intent(&lower) {
            return IntentDecision::FollowUp(intent);
        }
    }

    IntentDecision::General
}
