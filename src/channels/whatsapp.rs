//! Twilio WhatsApp transport

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{MessageTransport, TransportError};
use crate::config::Config;

const SEND_TIMEOUT_SECS: u64 = 30;

/// Strip the provider prefix from an inbound `From` field:
/// "whatsapp:+918044475773" -> "+918044475773".
pub fn extract_phone_number(from_field: &str) -> Option<String> {
    let number = from_field.strip_prefix("whatsapp:").unwrap_or(from_field);
    let number = number.trim();
    if number.is_empty() {
        None
    } else {
        Some(number.to_string())
    }
}

pub struct WhatsAppClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl WhatsAppClient {
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_whatsapp_from.clone(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        )
    }
}

#[async_trait]
impl MessageTransport for WhatsAppClient {
    async fn send(&self, phone_number: &str, text: &str) -> Result<(), TransportError> {
        let body = format!(
            "To={}&From={}&Body={}",
            urlencoding::encode(&format!("whatsapp:{}", phone_number)),
            urlencoding::encode(&format!("whatsapp:{}", self.from_number)),
            urlencoding::encode(text),
        );

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("WhatsApp send failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::new(format!(
                "WhatsApp send returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }

    /// Twilio media URLs require the same basic auth as the send API.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Media download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(format!(
                "Media download returned {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("Media read failed: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
