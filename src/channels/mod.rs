pub mod whatsapp;

pub use whatsapp::{extract_phone_number, WhatsAppClient};

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Messaging transport seam. Sends are fire-and-forget from the caller's
/// perspective; no delivery receipt is awaited.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, phone_number: &str, text: &str) -> Result<(), TransportError>;

    /// Download an inbound media attachment (provider-hosted URL).
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// Capturing transport for tests.
#[derive(Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    media: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(media: Vec<u8>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            media: Arc::new(Mutex::new(Some(media))),
        }
    }

    /// Every (phone_number, text) pair sent so far, in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl MessageTransport for MockTransport {
    async fn send(&self, phone_number: &str, text: &str) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((phone_number.to_string(), text.to_string()));
        Ok(())
    }

    async fn fetch_media(&self, _url: &str) -> Result<Vec<u8>, TransportError> {
        self.media
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::new("no media configured on mock"))
    }
}
