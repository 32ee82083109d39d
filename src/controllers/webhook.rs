use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;

use crate::channels::extract_phone_number;
use crate::models::StatusResponse;
use crate::AppState;

/// Twilio's form-encoded inbound webhook payload. Field names are Twilio's.
#[derive(Debug, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "MediaUrl0", default)]
    pub media_url: Option<String>,
}

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhook").route(web::post().to(receive_message)));
}

/// Inbound WhatsApp message. Always answers 200 so the provider never
/// retries; a malformed event gets an error envelope instead.
async fn receive_message(state: web::Data<AppState>, form: web::Form<WebhookForm>) -> impl Responder {
    let phone_number = match extract_phone_number(&form.from) {
        Some(p) => p,
        None => {
            log::warn!("Webhook event without a sender, ignoring");
            return HttpResponse::Ok().json(StatusResponse::error("missing sender phone number"));
        }
    };

    let media_url = form
        .media_url
        .as_deref()
        .filter(|u| !u.trim().is_empty());

    log::info!(
        "Inbound from {}: {} chars, media={}",
        phone_number,
        form.body.chars().count(),
        media_url.is_some()
    );

    let action = state
        .dispatcher
        .handle_inbound(&phone_number, &form.body, media_url)
        .await;

    HttpResponse::Ok().json(StatusResponse::success_with_action(action.as_str()))
}
