use std::collections::HashMap;

use actix_web::{web, HttpResponse, Responder};
use serde_json::Value;

use crate::calls::denormalize_phone_number;
use crate::models::{CallTranscript, StatusResponse};
use crate::AppState;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/transcript").route(web::post().to(receive_transcript)));
    cfg.service(web::resource("/after-call").route(web::post().to(receive_transcript)));
}

/// The dialer posts transcripts as JSON or form-encoded, depending on the
/// provider's configured callback mode. Try JSON first, fall back to form.
fn parse_transcript(body: &[u8]) -> Option<CallTranscript> {
    if let Ok(transcript) = serde_json::from_slice::<CallTranscript>(body) {
        return Some(transcript);
    }

    let text = std::str::from_utf8(body).ok()?;
    let mut fields: HashMap<String, String> = HashMap::new();
    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next().unwrap_or("");
        let key = urlencoding::decode(key).ok()?.into_owned();
        let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
        fields.insert(key, value);
    }

    if fields.is_empty() {
        return None;
    }

    let conversation = fields
        .get("call_conversation")
        .map(|raw| Value::String(raw.clone()))
        .unwrap_or(Value::Null);

    Some(CallTranscript {
        did_no: fields.get("did_no").cloned().unwrap_or_default(),
        call_duration: fields.get("call_duration").cloned().unwrap_or_default(),
        recordid: fields.get("recordid").cloned().unwrap_or_default(),
        call_conversation: conversation,
    })
}

/// Post-call transcript callback. Always answers 200; a transcript that can't
/// be attributed or summarized reports why in the envelope.
async fn receive_transcript(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let transcript = match parse_transcript(&body) {
        Some(t) => t,
        None => {
            log::warn!("Unparseable transcript callback ({} bytes)", body.len());
            return HttpResponse::Ok().json(StatusResponse::error("unparseable transcript payload"));
        }
    };

    if transcript.did_no.trim().is_empty() {
        return HttpResponse::Ok().json(StatusResponse::error("transcript without a phone number"));
    }

    let phone_number =
        denormalize_phone_number(&transcript.did_no, &state.config.country_code_prefix);
    let user_id = phone_number.clone();

    // A transcript only makes sense for a caller the bot has talked to; the
    // summary is delivered back over their WhatsApp thread.
    if let Ok(None) = state.db.get_user(&user_id) {
        log::warn!("Transcript for unknown caller {}", user_id);
        return HttpResponse::Ok().json(StatusResponse::error("unknown caller"));
    }

    log::info!(
        "Transcript for {} ({}s, record {})",
        user_id,
        transcript.duration_seconds(),
        transcript.recordid
    );

    if state
        .summarizer
        .summarize(&user_id, &phone_number, &transcript)
        .await
    {
        HttpResponse::Ok().json(StatusResponse::success_with_action("summary_sent"))
    } else {
        HttpResponse::Ok().json(StatusResponse::success_with_action("no_user_speech"))
    }
}
