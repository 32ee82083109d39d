use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standard JSON envelope for every route: `status` + RFC3339 `timestamp`,
/// plus an optional action/message for context.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            action: None,
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn success_with_action(action: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            action: Some(action.into()),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            action: None,
            message: Some(message.into()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Body for `POST /treatment-details`.
#[derive(Debug, Deserialize)]
pub struct TreatmentRequest {
    pub user_id: String,
    pub crop: String,
    #[serde(default)]
    pub disease: String,
}

/// Body for `POST /follow-up`.
#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    pub user_id: String,
    pub intent: String,
    #[serde(default)]
    pub crop_type: String,
    #[serde(default)]
    pub disease: String,
}
