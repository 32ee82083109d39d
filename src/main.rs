use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod ai;
mod calls;
mod channels;
mod config;
mod controllers;
mod db;
mod dispatch;
mod followup;
mod intent;
mod models;
mod session;
mod summary;

use ai::AiClient;
use calls::{CallOrchestrator, VoiceDialerClient};
use channels::WhatsAppClient;
use config::Config;
use db::Database;
use dispatch::{MessageDispatcher, OutboundDispatcher};
use followup::FollowUpResponder;
use session::SessionManager;
use summary::PostCallSummarizer;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub sessions: Arc<SessionManager>,
    pub outbound: Arc<OutboundDispatcher>,
    pub dispatcher: Arc<MessageDispatcher>,
    pub summarizer: Arc<PostCallSummarizer>,
    pub followups: Arc<FollowUpResponder>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    let sessions = Arc::new(SessionManager::new(
        db.clone(),
        config.session_ttl_minutes,
        config.context_window_turns,
    ));

    log::info!("Initializing WhatsApp transport");
    let transport: Arc<dyn channels::MessageTransport> = Arc::new(
        WhatsAppClient::from_config(&config).expect("Failed to build WhatsApp client"),
    );

    let outbound = Arc::new(OutboundDispatcher::new(
        db.clone(),
        sessions.clone(),
        transport.clone(),
    ));

    log::info!("Initializing AI client ({})", config.ai_model);
    let ai = Arc::new(AiClient::from_config(&config).expect("Failed to build AI client"));

    let dialer = VoiceDialerClient::from_config(&config).expect("Failed to build dialer client");
    let calls = Arc::new(CallOrchestrator::new(
        db.clone(),
        outbound.clone(),
        dialer,
        ai.clone(),
        &config,
    ));

    let dispatcher = Arc::new(MessageDispatcher::new(
        db.clone(),
        sessions.clone(),
        outbound.clone(),
        transport.clone(),
        ai.clone(),
        calls,
        &config,
    ));
    let summarizer = Arc::new(PostCallSummarizer::new(ai.clone(), outbound.clone()));
    let followups = Arc::new(FollowUpResponder::new(ai));

    log::info!("Starting Kheti backend on port {}", port);

    let state_config = config.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: state_config.clone(),
                sessions: Arc::clone(&sessions),
                outbound: Arc::clone(&outbound),
                dispatcher: Arc::clone(&dispatcher),
                summarizer: Arc::clone(&summarizer),
                followups: Arc::clone(&followups),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config_routes)
            .configure(controllers::webhook::config_routes)
            .configure(controllers::transcript::config_routes)
            .configure(controllers::followup::config_routes)
            .configure(controllers::sessions::config_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
