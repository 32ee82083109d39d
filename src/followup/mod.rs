//! Follow-up response generation for the eight post-analysis intents.
//!
//! Five intents are fully templated (no I/O); three are model-backed with a
//! deterministic fallback so the user always gets a non-empty answer.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ai::{AiClient, Message};
use crate::intent::FollowUpIntent;
use crate::models::ConversationTurn;

const MAX_TOKENS: u32 = 600;
const TEMPERATURE: f32 = 0.3;

struct Template {
    intro: &'static str,
    body: &'static [&'static str],
}

static TEMPLATES: Lazy<HashMap<FollowUpIntent, Template>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(
        FollowUpIntent::Prevention,
        Template {
            intro: "🛡️ भविष्य में बचाव (Future Prevention):\n",
            body: &[
                "🔍 नियमित निगरानी (Regular Monitoring):",
                "• हर 7-10 दिन में खेत की जांच करें (Inspect field every 7-10 days)",
                "• सुबह-शाम पत्तियों की जांच (Check leaves morning-evening)",
                "",
                "🌱 फसल स्वास्थ्य (Crop Health):",
                "• पौधों के बीच उचित दूरी (Proper plant spacing)",
                "• अच्छी जल निकासी व्यवस्था (Good drainage system)",
                "• फसल चक्र अपनाएं (Practice crop rotation)",
                "",
                "🌿 प्राकृतिक बचाव (Natural Protection):",
                "• रोग प्रतिरोधी किस्में उगाएं (Use resistant varieties)",
                "• खेत की सफाई बनाए रखें (Maintain field hygiene)",
            ],
        },
    );
    map.insert(
        FollowUpIntent::Medicine,
        Template {
            intro: "🧪 दवा की पूरी जानकारी (Complete Medicine Information):\n",
            body: &[
                "⏰ छिड़काव का समय (Application Time):",
                "• सुबह 6-8 बजे या शाम 4-6 बजे (6-8 AM or 4-6 PM)",
                "• हवा कम हो और धूप तेज न हो (Low wind, mild sunlight)",
                "",
                "💧 मिश्रण तैयार करना (Preparation):",
                "• साफ पानी का इस्तेमाल करें (Use clean water)",
                "• पहले दवा, फिर पानी मिलाएं (Add chemical first, then water)",
                "• तुरंत इस्तेमाल करें (Use immediately)",
                "",
                "🦺 सुरक्षा उपाय (Safety Measures):",
                "• मास्क, दस्ताने पहनें (Wear mask, gloves)",
                "• बारिश से पहले न छिड़कें (Don't spray before rain)",
            ],
        },
    );
    map.insert(
        FollowUpIntent::Cost,
        Template {
            intro: "💰 लागत की जानकारी (Cost Information):\n",
            body: &[
                "💳 अनुमानित खर्च (Estimated Cost):",
                "• दवा की कीमत: ₹200-800 प्रति एकड़ (Medicine: ₹200-800/acre)",
                "• छिड़काव खर्च: ₹100-200 प्रति एकड़ (Spraying: ₹100-200/acre)",
                "• कुल लागत: ₹300-1000 प्रति एकड़ (Total: ₹300-1000/acre)",
                "",
                "📊 लागत की तुलना (Cost Comparison):",
                "• जैविक उपचार: 20-30% सस्ता (Organic: 20-30% cheaper)",
                "• रासायनिक उपचार: तत्काल प्रभाव (Chemical: Immediate effect)",
                "",
                "💡 बचत के तरीके (Cost Saving Tips):",
                "• सामूहिक खरीदारी करें (Group purchasing)",
                "• सरकारी सब्सिडी की जांच करें (Check govt. subsidies)",
            ],
        },
    );
    map.insert(
        FollowUpIntent::Management,
        Template {
            intro: "🌾 फसल प्रबंधन (Crop Management):\n",
            body: &[
                "📅 दैनिक देखभाल (Daily Care):",
                "• सुबह-शाम पानी की जांच (Check water AM/PM)",
                "• पत्तियों का रंग देखें (Monitor leaf color)",
                "• कीट-पतंगों की निगरानी (Watch for pests)",
                "",
                "🌿 साप्ताहिक कार्य (Weekly Tasks):",
                "• खरपतवार हटाना (Weed removal)",
                "• मिट्टी की नमी जांचना (Soil moisture check)",
                "• पोषक तत्वों की आपूर्ति (Nutrient supply)",
                "",
                "📊 मासिक मूल्यांकन (Monthly Assessment):",
                "• फसल की वृद्धि दर (Growth rate)",
                "• उत्पादन का अनुमान (Yield estimation)",
            ],
        },
    );
    map.insert(
        FollowUpIntent::Emergency,
        Template {
            intro: "🆘 आपातकालीन सहायता (Emergency Help):\n",
            body: &[
                "🚨 तत्काल कार्रवाई (Immediate Action):",
                "• प्रभावित हिस्से को अलग करें (Isolate affected area)",
                "• छिड़काव तुरंत बंद करें (Stop spraying immediately)",
                "• विशेषज्ञ से तुरंत संपर्क करें (Contact expert immediately)",
                "",
                "⚡ 24 घंटे की देखभाल (24-Hour Care):",
                "• हर 2 घंटे में जांच करें (Check every 2 hours)",
                "• पानी की आपूर्ति बनाए रखें (Maintain water supply)",
                "• फोटो खींचकर प्रगति ट्रैक करें (Track progress with photos)",
            ],
        },
    );
    map
});

/// Per-intent footer appended to every response.
pub fn footer(intent: FollowUpIntent) -> &'static str {
    match intent {
        FollowUpIntent::Treatment => "\n📞 व्यक्तिगत सलाह (Personal advice): हेल्पलाइन पर संपर्क करें",
        FollowUpIntent::Prevention => "\n🌱 याद रखें: रोकथाम इलाज से बेहतर है!",
        FollowUpIntent::Medicine => "\n⚠️ सावधानी: विशिष्ट खुराक के लिए विशेषज्ञ से सलाह लें",
        FollowUpIntent::Dosage => "\n🧮 नोट: खेत के आकार के अनुसार मात्रा समायोजित करें",
        FollowUpIntent::Cost => "\n💡 सुझाव: सामूहिक खरीदारी से बचत करें",
        FollowUpIntent::Management => "\n📊 ट्रैकिंग: दैनिक प्रगति का रिकॉर्ड रखें",
        FollowUpIntent::Timing => "\n⏰ लचीलापन: मौसम के अनुसार समय बदलें",
        FollowUpIntent::Emergency => "\n🆘 24/7 हेल्पलाइन पर तुरंत संपर्क करें",
    }
}

fn intro(intent: FollowUpIntent) -> &'static str {
    match intent {
        FollowUpIntent::Treatment => "💊 विस्तृत उपचार गाइड (Detailed Treatment Guide):\n",
        FollowUpIntent::Dosage => "🧮 खुराक कैलकुलेटर (Dosage Calculator):\n",
        FollowUpIntent::Timing => "⏰ समय सारणी (Schedule & Timing):\n",
        other => TEMPLATES
            .get(&other)
            .map(|t| t.intro)
            .unwrap_or("🌾 जानकारी (Information):\n"),
    }
}

fn crop_or_generic(crop_type: &str) -> &str {
    if crop_type.trim().is_empty() {
        "आपकी फसल"
    } else {
        crop_type
    }
}

/// Deterministic treatment text when the model backend is unavailable.
fn treatment_fallback(crop_type: &str) -> String {
    let crop = crop_or_generic(crop_type);
    format!(
        "{} के लिए विस्तृत आंकड़े अभी उपलब्ध नहीं हैं (Detailed data unavailable right now).\n\
         • रोग/कीट की सटीक पहचान करें (Identify the exact disease/pest)\n\
         • उपयुक्त कवकनाशी/कीटनाशक लगाएं (Apply appropriate fungicide/pesticide)\n\
         • खेत की सफाई बनाए रखें (Maintain field hygiene)\n\
         • उपचार के बाद प्रगति देखें (Monitor progress after treatment)\n",
        crop
    )
}

fn dosage_fallback(crop_type: &str) -> String {
    let crop = crop_or_generic(crop_type);
    format!(
        "{} के लिए मानक खुराक गणना (Standard dosage for {}):\n\
         \n📏 खेत का क्षेत्रफल (Field Area):\n\
         • 1 एकड़ के लिए: 200-300 ली. पानी (For 1 acre: 200-300 L water)\n\
         • 1 बीघा के लिए: 80-120 ली. पानी (For 1 bigha: 80-120 L water)\n\
         \n💊 दवा की मात्रा (Medicine Quantity):\n\
         • कवकनाशी (Fungicide): 2-3 ग्राम प्रति लीटर\n\
         • कीटनाशक (Insecticide): 1-2 मिली प्रति लीटर\n\
         \n⚖️ मिश्रण अनुपात (Mixing Ratio):\n\
         • पहले पानी, फिर दवा मिलाएं\n\
         • 30 मिनट के अंदर इस्तेमाल करें\n",
        crop, crop
    )
}

fn timing_fallback(crop_type: &str) -> String {
    let crop = crop_or_generic(crop_type);
    format!(
        "{} के लिए समय सारणी (Schedule for {}):\n\
         \n🕒 दैनिक समय (Daily Timing):\n\
         • सुबह 6-8 बजे: निरीक्षण और पानी देना (Morning: inspection, watering)\n\
         • शाम 4-6 बजे: छिड़काव यदि आवश्यक (Evening: spraying if needed)\n\
         \n⏳ उपचार की अवधि (Treatment Duration):\n\
         • तत्काल राहत: 3-5 दिन (Immediate relief: 3-5 days)\n\
         • पूर्ण उपचार: 10-15 दिन (Full treatment: 10-15 days)\n\
         • पुनरावृत्ति रोकथाम: 21-30 दिन (Recurrence prevention: 21-30 days)\n",
        crop, crop
    )
}

/// The bilingual follow-up menu. Its first line doubles as the context
/// marker that keeps keyword-matching enabled for subsequent replies.
pub fn menu_response() -> String {
    "📢 और भी जानकारी चाहिए? (Need more information?)\n\n\
     🎯 कृपया इनमें से कोई शब्द टाइप करें (Please type one of these words):\n\n\
     💊 उपचार: 'उपचार' या 'treatment'\n\
     🛡️ बचाव: 'रोकथाम' या 'prevention'\n\
     🧪 दवा: 'दवा' या 'medicine'\n\
     🧮 खुराक: 'खुराक' या 'dosage'\n\
     💰 कीमत: 'कीमत' या 'cost'\n\
     🌾 प्रबंधन: 'प्रबंधन' या 'management'\n\
     ⏰ समय: 'समय' या 'timing'\n\
     🆘 तुरंत: 'तुरंत' या 'urgent'\n"
        .to_string()
}

pub struct FollowUpResponder {
    ai: Arc<AiClient>,
}

impl FollowUpResponder {
    pub fn new(ai: Arc<AiClient>) -> Self {
        Self { ai }
    }

    fn model_prompt(
        intent: FollowUpIntent,
        crop_type: &str,
        disease: &str,
        history: &[ConversationTurn],
    ) -> Vec<Message> {
        let crop = crop_or_generic(crop_type);
        let disease = if disease.trim().is_empty() {
            "अज्ञात रोग (unidentified)"
        } else {
            disease
        };

        // Most recent 5 turns, rendered oldest first.
        let mut context = String::new();
        for turn in history.iter().take(5).rev() {
            let speaker = if turn.is_bot { "Bot" } else { "Farmer" };
            let text = turn.text_or_empty();
            if !text.is_empty() {
                context.push_str(&format!("{}: {}\n", speaker, text));
            }
        }

        let task = match intent {
            FollowUpIntent::Treatment => "step-by-step treatment plan with specific products",
            FollowUpIntent::Dosage => "exact dosage calculations per acre and per bigha",
            FollowUpIntent::Timing => "a day-by-day application and care schedule",
            _ => "practical advice",
        };

        vec![
            Message::system(
                "You are an agricultural expert for Indian farmers. Answer in Hindi \
                 with English technical terms in brackets. Be specific and practical.",
            ),
            Message::user(format!(
                "Crop: {}\nDisease: {}\nRecent conversation:\n{}\nProvide {}.",
                crop, disease, context, task
            )),
        ]
    }

    /// Generate the response for a follow-up intent. Never empty, never fails:
    /// model-backed intents fall back to deterministic text on backend errors.
    pub async fn generate(
        &self,
        intent: FollowUpIntent,
        crop_type: &str,
        disease: &str,
        history: &[ConversationTurn],
    ) -> String {
        let mut response = intro(intent).to_string();

        match intent {
            FollowUpIntent::Treatment | FollowUpIntent::Dosage | FollowUpIntent::Timing => {
                let messages = Self::model_prompt(intent, crop_type, disease, history);
                match self.ai.complete(messages, MAX_TOKENS, TEMPERATURE).await {
                    Ok(text) => response.push_str(&text),
                    Err(e) => {
                        log::warn!("Follow-up {} fell back to template: {}", intent, e);
                        let fallback = match intent {
                            FollowUpIntent::Dosage => dosage_fallback(crop_type),
                            FollowUpIntent::Timing => timing_fallback(crop_type),
                            _ => treatment_fallback(crop_type),
                        };
                        response.push_str(&fallback);
                    }
                }
            }
            templated => {
                if let Some(template) = TEMPLATES.get(&templated) {
                    for line in template.body {
                        response.push_str(line);
                        response.push('\n');
                    }
                }
            }
        }

        response.push_str(footer(intent));
        response
    }
}

/// Derived view over recent turns: remembered crop/disease context for
/// follow-up answers. Recomputed on demand, never cached across requests.
#[derive(Debug, Default, Clone)]
pub struct FollowUpContext {
    pub crop_type: String,
    pub disease: String,
}

/// Value after the last colon of a labeled line, e.g.
/// "फसल (Crop Type): टमाटर" -> "टमाटर".
fn labeled_value(line: &str) -> Option<String> {
    let (_, value) = line.rsplit_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Scan recent turns (most-recent-first) for the last analysis's crop type
/// and disease. Crop comes from turn tags or "फसल"/"Crop Type" labeled
/// lines; disease from "बीमारी"/"Disease" labeled lines.
pub fn last_analysis_info(recent_turns: &[ConversationTurn]) -> FollowUpContext {
    let mut ctx = FollowUpContext::default();

    for turn in recent_turns {
        if ctx.crop_type.is_empty() {
            let tag = turn.tag_or_empty();
            if !tag.is_empty() && tag != "voice_call_summary" && tag != "progress_update" {
                ctx.crop_type = tag.to_string();
            }
        }

        let text = turn.text_or_empty();
        for line in text.lines() {
            if ctx.crop_type.is_empty()
                && (line.contains("Crop Type") || line.contains("फसल"))
            {
                if let Some(value) = labeled_value(line) {
                    ctx.crop_type = value;
                }
            }
            if ctx.disease.is_empty()
                && (line.contains("Disease") || line.contains("बीमारी"))
            {
                if let Some(value) = labeled_value(line) {
                    ctx.disease = value;
                }
            }
        }

        if !ctx.crop_type.is_empty() && !ctx.disease.is_empty() {
            break;
        }
    }

    ctx
}
