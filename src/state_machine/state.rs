//! Controller state types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use ts_rs::TS;

/// Whose turn it is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ControllerState {
    /// Nothing in flight; text or voice input accepted
    #[default]
    Ready,

    /// Voice capture active
    Listening {
        /// Correlates capture-service events with this capture
        capture_id: String,
        /// Speech recognized so far
        captured: String,
    },

    /// User turn committed, reply being generated; all input disabled
    Processing,

    /// Assistant turn committed and being voiced; all input disabled
    Speaking {
        /// Correlates synthesis completion with this reply
        utterance_id: String,
    },
}

impl ControllerState {
    /// Stable name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Ready => "ready",
            ControllerState::Listening { .. } => "listening",
            ControllerState::Processing => "processing",
            ControllerState::Speaking { .. } => "speaking",
        }
    }

    /// Text submission is only possible in `Ready`
    pub fn accepts_text(&self) -> bool {
        matches!(self, ControllerState::Ready)
    }

    /// The microphone toggle works in `Ready` and `Listening`
    pub fn accepts_voice_toggle(&self) -> bool {
        matches!(
            self,
            ControllerState::Ready | ControllerState::Listening { .. }
        )
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, ControllerState::Listening { .. })
    }

    /// Assistant holds the turn
    #[allow(dead_code)] // API completeness
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ControllerState::Processing | ControllerState::Speaking { .. }
        )
    }
}

/// What happens to speech once capture ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceSubmitPolicy {
    /// Captured text is placed in the draft; the user submits it explicitly
    #[default]
    Confirm,
    /// Captured text is committed as a user turn as soon as capture ends
    Auto,
}

/// Per-session configuration (immutable for the session's lifetime)
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub voice_submit: VoiceSubmitPolicy,
    /// Speaking duration used when the synthesizer cannot report completion.
    /// `None` when the synthesizer signals completion itself.
    pub speech_fallback: Option<Duration>,
    /// Assistant turn recorded when a reply could not be produced
    pub error_notice: String,
}

/// Apology recorded when reply generation fails
pub const DEFAULT_ERROR_NOTICE: &str =
    "Sorry, I couldn't put together a reply just now. Please try again.";

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            voice_submit: VoiceSubmitPolicy::default(),
            speech_fallback: None,
            error_notice: DEFAULT_ERROR_NOTICE.to_string(),
        }
    }

    pub fn with_voice_submit(mut self, policy: VoiceSubmitPolicy) -> Self {
        self.voice_submit = policy;
        self
    }

    pub fn with_speech_fallback(mut self, fallback: Option<Duration>) -> Self {
        self.speech_fallback = fallback;
        self
    }

    pub fn with_error_notice(mut self, notice: impl Into<String>) -> Self {
        self.error_notice = notice.into();
        self
    }
}
