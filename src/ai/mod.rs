pub mod openai;

pub use openai::OpenAiClient;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiError {
    pub message: String,
    /// True for timeouts and connection failures; false for unusable content.
    pub transient: bool,
}

impl AiError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AiError {}

/// Mock AI client for tests: returns pre-configured results from a queue and
/// captures the messages of every call for assertions.
#[derive(Clone)]
pub struct MockAiClient {
    responses: Arc<Mutex<VecDeque<Result<String, AiError>>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockAiClient {
    pub fn new(responses: Vec<Result<String, AiError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock whose every call fails as a transient network error.
    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    fn next_response(&self, messages: &[Message]) -> Result<String, AiError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::transient("mock exhausted")))
    }

    /// Messages of every `complete` call made so far.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Unified generative-backend client.
pub enum AiClient {
    OpenAi(OpenAiClient),
    Mock(MockAiClient),
}

impl AiClient {
    pub fn from_config(config: &crate::config::Config) -> Result<Self, String> {
        Ok(AiClient::OpenAi(OpenAiClient::from_config(config)?))
    }

    /// One completion call: full message history in, plain text out.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, AiError> {
        match self {
            AiClient::OpenAi(client) => client.complete(messages, max_tokens, temperature).await,
            AiClient::Mock(client) => client.next_response(&messages),
        }
    }
}
