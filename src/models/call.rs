use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Why an outbound voice call was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// User typed a call-request phrase ("call करें", "call me", ...).
    DirectRequest,
    /// User replied "yes" to a voice-bot offer.
    ConfirmedOffer,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::DirectRequest => "direct_request",
            TriggerReason::ConfirmedOffer => "confirmed_offer",
        }
    }
}

/// Terminal states of one call-dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Sent,
    Failed,
    Skipped,
}

/// Ephemeral record of one outbound voice-call attempt. Lives only for the
/// duration of the inbound event that produced it.
#[derive(Debug, Clone)]
pub struct CallTrigger {
    pub id: String,
    pub user_id: String,
    pub phone_number: String,
    pub reason: TriggerReason,
    pub requested_at: DateTime<Utc>,
    /// The message text that triggered the call, for the voice agent's context.
    pub trigger_message: String,
}

impl CallTrigger {
    pub fn new(user_id: &str, phone_number: &str, reason: TriggerReason, message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            phone_number: phone_number.to_string(),
            reason,
            requested_at: Utc::now(),
            trigger_message: message.to_string(),
        }
    }
}

/// Outcome of `CallOrchestrator::initiate`.
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub status: CallStatus,
    pub reason: String,
}

impl CallOutcome {
    pub fn sent() -> Self {
        Self {
            status: CallStatus::Sent,
            reason: "dialer accepted the call".to_string(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: CallStatus::Failed,
            reason: reason.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: CallStatus::Skipped,
            reason: reason.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == CallStatus::Sent
    }
}
