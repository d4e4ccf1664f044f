//! Effects produced by state transitions

use crate::services::ServiceError;
use crate::transcript::Speaker;
use std::time::Duration;

/// Which collaborator a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Capture,
    Generation,
    Synthesis,
}

impl Service {
    pub fn as_str(self) -> &'static str {
        match self {
            Service::Capture => "capture",
            Service::Generation => "generation",
            Service::Synthesis => "synthesis",
        }
    }
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Commit a turn to the transcript
    AppendTurn { speaker: Speaker, content: String },

    /// Ask the capture service to start listening
    StartCapture { capture_id: String },

    /// Ask the capture service to stop (also interrupts an in-flight start)
    StopCapture { capture_id: String },

    /// Generate a reply from the current transcript
    RequestReply,

    /// Voice the reply and animate the presence
    Speak { utterance_id: String, text: String },

    /// End `Speaking` after `delay` if nothing else does
    ScheduleSpeechFallback { utterance_id: String, delay: Duration },

    /// Hand captured speech to the input surface for confirmation
    OfferDraft { text: String },

    /// Surface a service failure to the user
    NotifyFailure { service: Service, error: ServiceError },
}

impl Effect {
    pub fn append_user(content: impl Into<String>) -> Self {
        Effect::AppendTurn {
            speaker: Speaker::User,
            content: content.into(),
        }
    }

    pub fn append_assistant(content: impl Into<String>) -> Self {
        Effect::AppendTurn {
            speaker: Speaker::Assistant,
            content: content.into(),
        }
    }

    pub fn notify_failure(service: Service, error: ServiceError) -> Self {
        Effect::NotifyFailure { service, error }
    }
}
