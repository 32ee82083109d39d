use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";

    pub const AI_ENDPOINT: &str = "KHETI_AI_ENDPOINT";
    pub const AI_API_KEY: &str = "KHETI_AI_API_KEY";
    pub const AI_MODEL: &str = "KHETI_AI_MODEL";

    pub const TWILIO_ACCOUNT_SID: &str = "TWILIO_ACCOUNT_SID";
    pub const TWILIO_AUTH_TOKEN: &str = "TWILIO_AUTH_TOKEN";
    pub const TWILIO_WHATSAPP_FROM: &str = "TWILIO_WHATSAPP_FROM";

    pub const DIALER_ENDPOINT: &str = "KHETI_DIALER_ENDPOINT";
    pub const DIALER_AUTH_TOKEN: &str = "KHETI_DIALER_AUTH_TOKEN";
    pub const DIALER_VOICECHAT_ID: &str = "KHETI_DIALER_VOICECHAT_ID";
    pub const DIALER_AGENT_EXT: &str = "KHETI_DIALER_AGENT_EXT";

    pub const COUNTRY_CODE_PREFIX: &str = "KHETI_COUNTRY_CODE_PREFIX";
    pub const SESSION_TTL_MINUTES: &str = "KHETI_SESSION_TTL_MINUTES";
    pub const CONTEXT_WINDOW_TURNS: &str = "KHETI_CONTEXT_WINDOW_TURNS";
    pub const SUPPORT_PHONE: &str = "KHETI_SUPPORT_PHONE";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/kheti.db";
    pub const AI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
    pub const AI_MODEL: &str = "gpt-4o";
    pub const DIALER_ENDPOINT: &str = "https://api.ivrsolutions.in/api/dial_by_voicebot";
    pub const COUNTRY_CODE_PREFIX: &str = "91";
    pub const SESSION_TTL_MINUTES: i64 = 30;
    pub const CONTEXT_WINDOW_TURNS: usize = 20;
    pub const SUPPORT_PHONE: &str = "+91 85188 00080";
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,

    pub ai_endpoint: String,
    pub ai_api_key: String,
    pub ai_model: String,

    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_whatsapp_from: String,

    pub dialer_endpoint: String,
    pub dialer_auth_token: String,
    pub dialer_voicechat_id: String,
    pub dialer_agent_ext: i64,

    /// Country code stripped during phone normalization for the dialer.
    pub country_code_prefix: String,
    pub session_ttl_minutes: i64,
    pub context_window_turns: usize,
    /// Human helpline shown in user-facing messages.
    pub support_phone: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parsed(env_vars::PORT, defaults::PORT),
            database_url: env_or(env_vars::DATABASE_URL, defaults::DATABASE_URL),

            ai_endpoint: env_or(env_vars::AI_ENDPOINT, defaults::AI_ENDPOINT),
            ai_api_key: env_or(env_vars::AI_API_KEY, ""),
            ai_model: env_or(env_vars::AI_MODEL, defaults::AI_MODEL),

            twilio_account_sid: env_or(env_vars::TWILIO_ACCOUNT_SID, ""),
            twilio_auth_token: env_or(env_vars::TWILIO_AUTH_TOKEN, ""),
            twilio_whatsapp_from: env_or(env_vars::TWILIO_WHATSAPP_FROM, ""),

            dialer_endpoint: env_or(env_vars::DIALER_ENDPOINT, defaults::DIALER_ENDPOINT),
            dialer_auth_token: env_or(env_vars::DIALER_AUTH_TOKEN, ""),
            dialer_voicechat_id: env_or(env_vars::DIALER_VOICECHAT_ID, ""),
            dialer_agent_ext: env_parsed(env_vars::DIALER_AGENT_EXT, 0),

            country_code_prefix: env_or(
                env_vars::COUNTRY_CODE_PREFIX,
                defaults::COUNTRY_CODE_PREFIX,
            ),
            session_ttl_minutes: env_parsed(
                env_vars::SESSION_TTL_MINUTES,
                defaults::SESSION_TTL_MINUTES,
            ),
            context_window_turns: env_parsed(
                env_vars::CONTEXT_WINDOW_TURNS,
                defaults::CONTEXT_WINDOW_TURNS,
            ),
            support_phone: env_or(env_vars::SUPPORT_PHONE, defaults::SUPPORT_PHONE),
        }
    }
}
