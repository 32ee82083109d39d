pub mod api;
pub mod call;
pub mod message;
pub mod session;
pub mod transcript;
pub mod user;

pub use api::{FollowUpRequest, StatusResponse, TreatmentRequest};
pub use call::{CallOutcome, CallStatus, CallTrigger, TriggerReason};
pub use message::ConversationTurn;
pub use session::SessionInfo;
pub use transcript::{CallTranscript, TranscriptEntry};
pub use user::UserRecord;
