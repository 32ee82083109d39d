use actix_web::{web, HttpResponse, Responder};

use crate::models::StatusResponse;
use crate::AppState;

pub fn config_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/sessions/{user_id}")
            .route(web::get().to(get_session))
            .route(web::delete().to(delete_session)),
    );
}

async fn get_session(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let user_id = path.into_inner();
    match state.sessions.session_info(&user_id) {
        Some(info) => HttpResponse::Ok().json(info),
        None => HttpResponse::NotFound().json(StatusResponse::error("no active session")),
    }
}

async fn delete_session(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let user_id = path.into_inner();
    if state.sessions.clear(&user_id) {
        log::info!("Session cleared for {}", user_id);
        HttpResponse::Ok().json(StatusResponse::success_with_action("session_cleared"))
    } else {
        HttpResponse::NotFound().json(StatusResponse::error("no active session"))
    }
}
