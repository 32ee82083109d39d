pub mod followup;
pub mod health;
pub mod sessions;
pub mod transcript;
pub mod webhook;
