use actix_web::{web, HttpResponse, Responder};
use serde_json::{json, Map, Value};

use crate::followup;
use crate::intent::{self, FollowUpIntent};
use crate::models::{FollowUpRequest, StatusResponse, TreatmentRequest};
use crate::AppState;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/treatment-details").route(web::post().to(send_treatment_details)));
    cfg.service(web::resource("/follow-up").route(web::post().to(send_follow_up)));
    cfg.service(web::resource("/follow-up/intents").route(web::get().to(list_intents)));
}

/// Every follow-up intent the engine recognizes, with the keywords that
/// trigger it over WhatsApp.
fn intent_listing() -> Value {
    let mut intents = Map::new();
    for (intent, english, hindi) in intent::intent_catalog() {
        intents.insert(
            intent.as_str().to_string(),
            json!({
                "description": intent.description(),
                "keywords": { "english": english, "hindi": hindi },
            }),
        );
    }
    json!({ "intents": intents })
}

async fn list_intents() -> impl Responder {
    HttpResponse::Ok().json(intent_listing())
}

/// Push the detailed treatment guide for a crop/disease pair to a user.
async fn send_treatment_details(
    state: web::Data<AppState>,
    body: web::Json<TreatmentRequest>,
) -> impl Responder {
    if body.user_id.trim().is_empty() {
        return HttpResponse::BadRequest().json(StatusResponse::error("user_id is required"));
    }

    let history = state.db.get_recent(&body.user_id, 10).unwrap_or_default();
    let answer = state
        .followups
        .generate(FollowUpIntent::Treatment, &body.crop, &body.disease, &history)
        .await;

    state
        .outbound
        .deliver(&body.user_id, &body.user_id, &answer, None)
        .await;

    HttpResponse::Ok().json(StatusResponse::success_with_action("treatment_sent"))
}

/// Push one follow-up answer for an explicitly named intent. An intent the
/// engine doesn't know is the caller's mistake, not a user message: 400.
async fn send_follow_up(
    state: web::Data<AppState>,
    body: web::Json<FollowUpRequest>,
) -> impl Responder {
    if body.user_id.trim().is_empty() {
        return HttpResponse::BadRequest().json(StatusResponse::error("user_id is required"));
    }

    let intent = match FollowUpIntent::from_str(&body.intent) {
        Some(i) => i,
        None => {
            return HttpResponse::BadRequest().json(StatusResponse::error(format!(
                "unknown intent '{}'",
                body.intent
            )));
        }
    };

    let history = state.db.get_recent(&body.user_id, 10).unwrap_or_default();
    let answer = state
        .followups
        .generate(intent, &body.crop_type, &body.disease, &history)
        .await;

    state
        .outbound
        .deliver(&body.user_id, &body.user_id, &answer, None)
        .await;
    state
        .outbound
        .deliver(&body.user_id, &body.user_id, &followup::menu_response(), None)
        .await;

    HttpResponse::Ok().json(StatusResponse::success_with_action("follow_up_sent"))
}
