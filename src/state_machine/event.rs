//! Events that can occur in a session

use crate::services::ServiceError;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Input surface
    SubmitText {
        text: String,
    },
    ToggleVoice {
        /// Fresh id, used only when this toggle starts a capture
        capture_id: String,
    },

    // Capture service
    TranscriptChunk {
        capture_id: String,
        text: String,
    },
    CaptureStopped {
        capture_id: String,
    },
    CaptureFailed {
        capture_id: String,
        error: ServiceError,
    },

    // Response generation
    ReplyReady {
        /// Becomes the utterance id while the reply is voiced
        reply_id: String,
        text: String,
    },
    GenerationFailed {
        error: ServiceError,
    },

    // Synthesis
    SpeechFinished {
        utterance_id: String,
    },
    SpeechFailed {
        utterance_id: String,
        error: ServiceError,
    },
    SpeechFallbackElapsed {
        utterance_id: String,
    },
}

impl Event {
    pub fn toggle_voice() -> Self {
        Event::ToggleVoice {
            capture_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Stable name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Event::SubmitText { .. } => "submit_text",
            Event::ToggleVoice { .. } => "toggle_voice",
            Event::TranscriptChunk { .. } => "transcript_chunk",
            Event::CaptureStopped { .. } => "capture_stopped",
            Event::CaptureFailed { .. } => "capture_failed",
            Event::ReplyReady { .. } => "reply_ready",
            Event::GenerationFailed { .. } => "generation_failed",
            Event::SpeechFinished { .. } => "speech_finished",
            Event::SpeechFailed { .. } => "speech_failed",
            Event::SpeechFallbackElapsed { .. } => "speech_fallback_elapsed",
        }
    }
}
