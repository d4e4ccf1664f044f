//! API request and response types

use crate::input::Controls;
use crate::presence::PresenceDescriptor;
use crate::state_machine::ControllerState;
use crate::transcript::Turn;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Everything a client needs to render a session
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: ControllerState,
    pub presence: PresenceDescriptor,
    /// Status pill text
    pub status: String,
    pub controls: Controls,
    pub draft: String,
    pub transcript: Vec<Turn>,
}

/// Request to replace the pending draft
#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub text: String,
}

/// Submit request; without `text` the current draft is submitted
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    pub text: Option<String>,
}

/// Recognized speech from the browser's recognizer
#[derive(Debug, Deserialize)]
pub struct ChunkRequest {
    pub text: String,
}

/// Playback of a `speak` event ended client side
#[derive(Debug, Deserialize)]
pub struct SpeechFinishedRequest {
    /// The `speak` event whose playback ended
    pub utterance_id: String,
}

/// Outcome of an input action. Rejected input is not an HTTP error.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct InputResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub reason: Option<String>,
    pub draft: String,
    pub controls: Controls,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
